pub(crate) fn num_bytes_for_bits(count: u16) -> usize {
    (count as usize + 7) / 8
}
