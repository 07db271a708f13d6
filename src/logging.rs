use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::LevelFilter;
use log4rs_dynamic_filters::DynamicLevelFilter;

use crate::error::{Error, Result};

/// A unique identifier for one signing or authentication attempt, used to
/// correlate the initiation and status log lines of the same session.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct SessionTag(pub usize);

impl Display for SessionTag {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SessionTag {
    /// Atomically get the next tag. This wraps around back to zero if you somehow exceed a usize.
    pub fn next() -> SessionTag {
        static SESSION_TAG_COUNTER: AtomicUsize = AtomicUsize::new(0);
        SessionTag(SESSION_TAG_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Initialise log4rs from a YAML file. Services that already configure
/// logging themselves should not call this.
pub fn init_logging(path: impl AsRef<Path>) -> Result<()> {
    log4rs::init_file(path, log4rs_dynamic_filters::default_deserializers())
        .map_err(|e| Error::Logging(e.to_string()))?;
    info!("Initialised logging");
    Ok(())
}

/// Silence a noisy target at runtime, e.g. `reqwest` or `mongodb`.
/// Only effective for targets routed through a `dynamic_level` filter.
pub fn quiet_target(target: &str) {
    DynamicLevelFilter::set(target, LevelFilter::Off);
}

/// Hide all but the last four characters of a personal identification code.
pub fn mask(personal_id: &str) -> String {
    let visible = personal_id.chars().count().saturating_sub(4);
    personal_id
        .chars()
        .enumerate()
        .map(|(i, c)| if i < visible { '*' } else { c })
        .collect()
}
