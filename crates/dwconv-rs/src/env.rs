use std::env;
use std::sync::OnceLock;

static DWCONV_SIMD_LANES: OnceLock<Option<usize>> = OnceLock::new();

fn parse_positive(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok().filter(|lanes| *lanes > 0)
}

/// Lane count forced through `DWCONV_SIMD_LANES`, read once per process.
pub(crate) fn simd_lanes_override() -> Option<usize> {
    *DWCONV_SIMD_LANES.get_or_init(|| match env::var("DWCONV_SIMD_LANES") {
        Ok(value) if !value.trim().is_empty() => {
            let parsed = parse_positive(&value);
            if parsed.is_none() {
                tracing::warn!(value = %value, "ignoring invalid DWCONV_SIMD_LANES");
            }
            parsed
        }
        _ => None,
    })
}
