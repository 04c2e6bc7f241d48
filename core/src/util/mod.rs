pub type FastHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

#[inline]
pub fn fast_hash_map_with_capacity<K, V>(capacity: usize) -> FastHashMap<K, V> {
    rustc_hash::FxHashMap::with_capacity_and_hasher(capacity, Default::default())
}

/// Heap field key for an integer index (`arr_3["0"]`).
#[inline]
pub fn index_key(index: i64) -> String {
    let mut buf = itoa::Buffer::new();
    buf.format(index).to_owned()
}

/// Float rendering close to what the source languages print (`2.0`, `0.5`).
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let mut buf = ryu::Buffer::new();
    buf.format_finite(value).to_owned()
}

/// Splits `"name_12"` into its numeric suffix when the name uses `prefix`.
pub fn numeric_suffix(name: &str, prefix: &str) -> Option<u64> {
    name.strip_prefix(prefix)?.parse().ok()
}
