//! SAX event interface between the decoders and their consumers.

/// Receiver for the event stream of exactly one record.
///
/// Both decoders (binary and JSON-lines) drive the same events, so the
/// matcher, the JSON re-emitter, and the encoder payload builder are all
/// flavour-agnostic. Strings arrive in bounded fragments; interned strings
/// arrive pre-resolved as a borrowed `&str`, so observing one never
/// allocates. Sinks do not fail: a sink that can error (e.g. a writer)
/// stashes its error and reports it after the record.
pub trait ValueSink {
    fn on_null(&mut self);
    fn on_bool(&mut self, value: bool);
    fn on_int(&mut self, value: i64);
    fn on_uint(&mut self, value: u64);
    fn on_double(&mut self, value: f64);
    /// Timestamp, nanoseconds since the Unix epoch.
    fn on_time(&mut self, nanos: i64);
    /// `len` is a size hint: exact for the binary format, 0 for JSON text.
    fn on_string_start(&mut self, len: usize);
    fn on_string_fragment(&mut self, fragment: &[u8]);
    fn on_string_end(&mut self);
    /// Interned string, resolved against the current dictionary generation.
    fn on_dict_ref(&mut self, index: usize, value: &str);
    fn on_object_start(&mut self);
    fn on_object_end(&mut self);
    fn on_array_start(&mut self);
    fn on_array_end(&mut self);
}
