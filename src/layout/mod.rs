//! Layout synthesis and sanitization
//!
//! Pure policy → configuration machinery: [`synthesis`] builds one candidate
//! [`crate::randr::Config`] per layout policy from the live topology, and
//! [`sanitize`] filters a candidate list down to the configurations the
//! display controller can actually accept.

pub mod sanitize;
pub mod synthesis;

pub use sanitize::{sanitize, trim_rightmost};
pub use synthesis::{
    clone_setup, default_setup, find_best_mode, laptop_setup, other_setup, xinerama_setup,
};
