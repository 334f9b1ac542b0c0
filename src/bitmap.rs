use bitvec::slice::BitSlice;

use crate::latency::Latency;

/// Claims the lowest free bit of `bitmap` and marks it occupied. A value of `true` represents
/// "occupied".
///
/// `latency` is touched once for every `page` bits scanned, starting with the first.
pub fn claim_first_free(bitmap: &mut BitSlice, page: usize, latency: &Latency) -> Option<usize> {
    let page = page.max(1);

    for index in 0..bitmap.len() {
        if index % page == 0 {
            latency.touch();
        }

        if !bitmap[index] {
            bitmap.set(index, true);
            return Some(index);
        }
    }

    None
}
