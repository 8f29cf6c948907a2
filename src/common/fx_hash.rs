//! Thin re-export of `rustc-hash`'s FxHash maps/sets under the crate's own
//! naming, used everywhere a `Value`/`BlockId`-keyed map needs to avoid
//! `SipHash`'s overhead for small integer keys.

pub use rustc_hash::{FxHashMap, FxHashSet};
