//! Shape arithmetic shared by packing and layout code.

/// Computes `product(dims)` with overflow checking.
pub fn checked_element_count_or_error<E, F>(dims: &[usize], mut on_overflow: F) -> Result<usize, E>
where
    F: FnMut() -> E,
{
    let mut count = 1usize;
    for dim in dims {
        count = count.checked_mul(*dim).ok_or_else(&mut on_overflow)?;
    }
    Ok(count)
}

/// Builds row-major contiguous strides with overflow checking.
pub fn contiguous_strides_or_error<E, F>(
    dims: &[usize],
    mut on_overflow: F,
) -> Result<Vec<usize>, E>
where
    F: FnMut() -> E,
{
    let mut strides = vec![0usize; dims.len()];
    let mut stride = 1usize;
    for axis in (0..dims.len()).rev() {
        strides[axis] = stride;
        stride = stride
            .checked_mul(dims[axis])
            .ok_or_else(&mut on_overflow)?;
    }
    Ok(strides)
}

/// Row-major linear offset of `index` under `strides`.
pub fn linear_offset(index: &[usize], strides: &[usize]) -> usize {
    index
        .iter()
        .zip(strides.iter())
        .map(|(idx, stride)| idx * stride)
        .sum()
}

/// Output extent of a strided window sweep, `None` when the window does not fit.
pub fn conv_out_extent(
    input: usize,
    pad_before: usize,
    pad_after: usize,
    kernel: usize,
    stride: usize,
) -> Option<usize> {
    if stride == 0 {
        return None;
    }
    let padded = input.checked_add(pad_before)?.checked_add(pad_after)?;
    let span = padded.checked_sub(kernel)?;
    Some(span / stride + 1)
}
