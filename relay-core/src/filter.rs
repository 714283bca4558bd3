//! In-memory probabilistic pre-filter over indexed outpoints and scripts
//! (spec §4.D). Kept out of the hot path's database hit for the overwhelming
//! majority of transaction inputs/outputs that touch nothing subscribed.

use bloomfilter::Bloom;

use crate::error::Result;
use crate::index::{OutpointIndex, ScriptIndex};
use crate::store::Store;

/// Sizing knobs; defaults match spec §4.D (n=20000, p=0.001). Exposed as
/// configuration (spec §9 Open Question 4).
#[derive(Debug, Clone, Copy)]
pub struct FilterParams {
    pub items: usize,
    pub fp_rate: f64,
}

impl Default for FilterParams {
    fn default() -> Self {
        FilterParams {
            items: 20_000,
            fp_rate: 0.001,
        }
    }
}

impl FilterParams {
    pub fn validate(&self) -> Result<()> {
        if !(self.fp_rate > 0.0 && self.fp_rate < 1.0) {
            return Err(crate::error::Error::Validation(format!(
                "bloom fp_rate must be in (0, 1), got {}",
                self.fp_rate
            )));
        }
        if self.items == 0 {
            return Err(crate::error::Error::Validation(
                "bloom items must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

pub struct Filter {
    bloom: Bloom<[u8]>,
}

impl Filter {
    pub fn new(params: FilterParams) -> Result<Self> {
        params.validate()?;
        Ok(Filter {
            bloom: Bloom::new_for_fp_rate(params.items, params.fp_rate),
        })
    }

    pub fn add(&mut self, item: &[u8]) {
        self.bloom.set(item);
    }

    pub fn test(&self, item: &[u8]) -> bool {
        self.bloom.check(item)
    }

    /// Rebuild from scratch by scanning every indexed script and outpoint
    /// (spec §4.D `open()` behaviour).
    pub fn rebuild(store: &Store, params: FilterParams) -> Result<Self> {
        let mut filter = Self::new(params)?;
        for rec in ScriptIndex::iter(store) {
            filter.add(rec?.script.as_bytes());
        }
        for rec in OutpointIndex::iter(store) {
            filter.add(&rec?.prevout.key_bytes());
        }
        Ok(filter)
    }
}
