//! CUDA C source generator for the sort kernels.
//!
//! NVRTC compiles one module per `(key, value)` element pair. A pair module
//! holds the stable merge pass for that pair and a gather kernel for the key
//! type. The index kernels (`iota`, `segment_ids`) live in a separate module
//! shared by every sort.
//!
//! Kernel names are fixed inside each module; the module name carries the
//! element types.

use anyhow::{bail, Result};
use tracing::debug;

/// Module holding the index kernels.
pub const INDEX_MODULE: &str = "sort_index";
/// Kernel names of [`INDEX_MODULE`].
pub const INDEX_KERNELS: &[&str] = &["iota", "segment_ids"];
/// Kernel names of every pair module.
pub const PAIR_KERNELS: &[&str] = &["merge_pass", "gather"];

/// CUDA-side description of an element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElemType {
    /// C type spelling used in the generated source.
    pub c_name: &'static str,
    /// Short tag used in module names and logs.
    pub suffix: &'static str,
    /// Floats need a NaN-aware comparison.
    pub is_float: bool,
}

/// Element types the kernels can be instantiated for.
pub trait CudaType: Copy + Default + Send + Sync + 'static {
    const ELEM: ElemType;
}

macro_rules! impl_cuda_type {
    ($($ty:ty => $c:literal, $float:literal;)*) => {
        $(
            impl CudaType for $ty {
                const ELEM: ElemType = ElemType {
                    c_name: $c,
                    suffix: stringify!($ty),
                    is_float: $float,
                };
            }
        )*
    };
}

impl_cuda_type! {
    i8 => "signed char", false;
    i16 => "short", false;
    i32 => "int", false;
    i64 => "long long", false;
    u8 => "unsigned char", false;
    u16 => "unsigned short", false;
    u32 => "unsigned int", false;
    u64 => "unsigned long long", false;
    f32 => "float", true;
    f64 => "double", true;
    usize => "unsigned long long", false;
}

pub struct KernelCodegen;

impl KernelCodegen {
    pub fn new() -> Self {
        KernelCodegen
    }

    /// Name of the module compiled for a `(key, value)` pair.
    pub fn pair_module_name(&self, key: ElemType, value: ElemType) -> String {
        format!("sort_{}_{}", key.suffix, value.suffix)
    }

    /// Emit the `iota` and `segment_ids` kernels.
    pub fn emit_index_source(&self) -> String {
        debug!("Codegen index kernels");
        r#"
extern "C" __global__ void iota(unsigned long long* out, unsigned long long n) {
    unsigned long long i = (unsigned long long)blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) out[i] = i;
}

extern "C" __global__ void segment_ids(unsigned long long* out,
                                       unsigned long long n,
                                       unsigned long long row_length) {
    unsigned long long i = (unsigned long long)blockIdx.x * blockDim.x + threadIdx.x;
    if (i < n) out[i] = i / row_length;
}
"#
        .to_string()
    }

    /// Emit the merge pass and gather kernels for one `(key, value)` pair.
    ///
    /// `gather` never reads outside `src`. An out-of-range index is recorded
    /// in `fault[0]` (which must start at `~0`) as the smallest offending
    /// absolute position.
    ///
    /// `merge_pass` merges adjacent sorted runs of `width` elements. Every
    /// thread owns one input element and finds its output slot by binary
    /// search in the sibling run: elements of the left run count strictly
    /// smaller keys on the right, elements of the right run count keys that
    /// are not greater on the left. Ties therefore keep left-run elements
    /// first, which makes the sort stable.
    pub fn emit_pair_source(&self, key: ElemType, value: ElemType) -> Result<String> {
        if key.c_name.is_empty() || value.c_name.is_empty() {
            bail!("Codegen: empty C type for pair {:?}/{:?}", key, value);
        }
        debug!("Codegen pair kernels: key={} value={}", key.suffix, value.suffix);

        let less = if key.is_float {
            // NaN sorts after every number; NaNs compare equal.
            "return (a < b) || ((b != b) && (a == a));"
        } else {
            "return a < b;"
        };

        Ok(format!(
            r#"
typedef {k} key_type;
typedef {v} value_type;

static __device__ __forceinline__ bool key_less(key_type a, key_type b) {{
    {less}
}}

static __device__ __forceinline__ unsigned long long umin(unsigned long long a,
                                                          unsigned long long b) {{
    return a < b ? a : b;
}}

extern "C" __global__ void merge_pass(const key_type* __restrict__ keys_in,
                                      const value_type* __restrict__ vals_in,
                                      key_type* __restrict__ keys_out,
                                      value_type* __restrict__ vals_out,
                                      unsigned long long n,
                                      unsigned long long width) {{
    unsigned long long i = (unsigned long long)blockIdx.x * blockDim.x + threadIdx.x;
    if (i >= n) return;

    unsigned long long left = (i / (2 * width)) * (2 * width);
    unsigned long long mid = umin(left + width, n);
    unsigned long long right = umin(left + 2 * width, n);
    key_type key = keys_in[i];
    unsigned long long lo, hi, dst;

    if (i < mid) {{
        lo = mid;
        hi = right;
        while (lo < hi) {{
            unsigned long long m = lo + (hi - lo) / 2;
            if (key_less(keys_in[m], key)) lo = m + 1; else hi = m;
        }}
        dst = i + (lo - mid);
    }} else {{
        lo = left;
        hi = mid;
        while (lo < hi) {{
            unsigned long long m = lo + (hi - lo) / 2;
            if (key_less(key, keys_in[m])) hi = m; else lo = m + 1;
        }}
        dst = (i - mid) + lo;
    }}

    keys_out[dst] = key;
    vals_out[dst] = vals_in[i];
}}

extern "C" __global__ void gather(const key_type* __restrict__ src,
                                  unsigned long long src_len,
                                  unsigned long long offset,
                                  const unsigned long long* __restrict__ indices,
                                  key_type* __restrict__ out,
                                  unsigned long long n,
                                  unsigned long long* fault) {{
    unsigned long long j = (unsigned long long)blockIdx.x * blockDim.x + threadIdx.x;
    if (j >= n) return;
    unsigned long long idx = indices[j];
    if (offset >= src_len || idx >= src_len - offset) {{
        // smallest offending position wins; the slot is left untouched
        atomicMin(fault, offset + idx < offset ? ~0ULL - 1 : offset + idx);
        return;
    }}
    out[j] = src[offset + idx];
}}
"#,
            k = key.c_name,
            v = value.c_name,
            less = less,
        ))
    }
}

impl Default for KernelCodegen {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_source_contains_entries() {
        let cg = KernelCodegen::new();
        let src = cg.emit_pair_source(f32::ELEM, usize::ELEM).unwrap();
        for name in PAIR_KERNELS {
            assert!(src.contains(&format!("void {}(", name)), "missing {name}");
        }
        assert!(src.contains("typedef float key_type;"));
        assert!(src.contains("typedef unsigned long long value_type;"));
    }

    #[test]
    fn gather_checks_source_bounds() {
        let src = KernelCodegen::new()
            .emit_pair_source(i32::ELEM, usize::ELEM)
            .unwrap();
        assert!(src.contains("unsigned long long src_len"));
        assert!(src.contains("idx >= src_len - offset"));
        assert!(src.contains("atomicMin(fault"));
    }

    #[test]
    fn float_keys_get_nan_aware_compare() {
        let cg = KernelCodegen::new();
        let float_src = cg.emit_pair_source(f64::ELEM, usize::ELEM).unwrap();
        let int_src = cg.emit_pair_source(i16::ELEM, usize::ELEM).unwrap();
        assert!(float_src.contains("(b != b)"));
        assert!(!int_src.contains("(b != b)"));
    }

    #[test]
    fn module_names_encode_both_types() {
        let cg = KernelCodegen::new();
        assert_eq!(cg.pair_module_name(u8::ELEM, usize::ELEM), "sort_u8_usize");
        assert_eq!(cg.pair_module_name(usize::ELEM, f32::ELEM), "sort_usize_f32");
    }

    #[test]
    fn index_source_has_both_kernels() {
        let src = KernelCodegen::new().emit_index_source();
        for name in INDEX_KERNELS {
            assert!(src.contains(&format!("void {}(", name)));
        }
    }

    #[test]
    fn suffixes_are_rust_type_names() {
        assert_eq!(i64::ELEM.suffix, "i64");
        assert_eq!(usize::ELEM.c_name, "unsigned long long");
        assert!(f32::ELEM.is_float);
        assert!(!u32::ELEM.is_float);
    }
}
