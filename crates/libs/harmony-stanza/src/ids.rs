use rand_core::{OsRng, RngCore};

use crate::stanza::StanzaId;

/// Number of distinct correlation ids the hub accepts (`0..=999_999`).
pub const ID_SPACE: StanzaId = 1_000_000;

/// Allocates correlation ids.
///
/// Ids advance monotonically from a random starting point and wrap inside
/// [`ID_SPACE`]. [`RequestIds::next_free`] skips ids the caller reports as
/// still in flight, so two outstanding requests never share an id.
#[derive(Debug, Clone)]
pub struct RequestIds {
    next: StanzaId,
}

impl RequestIds {
    pub fn new() -> Self {
        Self::starting_at(OsRng.next_u32())
    }

    pub fn starting_at(start: StanzaId) -> Self {
        Self {
            next: start % ID_SPACE,
        }
    }

    /// Returns the next id without checking it against in-flight requests.
    pub fn next_id(&mut self) -> StanzaId {
        let id = self.next;
        self.next = (self.next + 1) % ID_SPACE;
        id
    }

    /// Returns the next id for which `in_use` is false, or `None` when every
    /// id in the space is taken.
    pub fn next_free(&mut self, in_use: impl Fn(StanzaId) -> bool) -> Option<StanzaId> {
        for _ in 0..ID_SPACE {
            let id = self.next_id();
            if !in_use(id) {
                return Some(id);
            }
        }
        None
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_wrap_inside_the_hub_id_space() {
        let mut ids = RequestIds::starting_at(ID_SPACE - 2);
        assert_eq!(ids.next_id(), 999_998);
        assert_eq!(ids.next_id(), 999_999);
        assert_eq!(ids.next_id(), 0);
    }

    #[test]
    fn random_start_stays_in_range() {
        for _ in 0..32 {
            assert!(RequestIds::new().next_id() < ID_SPACE);
        }
    }

    #[test]
    fn next_free_skips_ids_in_flight() {
        let mut ids = RequestIds::starting_at(10);
        let taken = [10, 11, 13];
        assert_eq!(ids.next_free(|id| taken.contains(&id)), Some(12));
        assert_eq!(ids.next_free(|id| taken.contains(&id)), Some(14));
    }

    #[test]
    fn next_free_reports_exhaustion() {
        let mut ids = RequestIds::starting_at(0);
        assert_eq!(ids.next_free(|_| true), None);
    }
}
