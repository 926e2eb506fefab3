#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]
#![cfg_attr(docsrs, feature(doc_cfg))]

extern crate alloc;

mod arena;
mod list;
mod node;

pub use list::{SkipMap, SkipMapIterator, UniSkipMapIterator};

/// The maximum tower height of any node, and therefore the maximum number
/// of levels the list can use. Towers are allocated truncated, so most
/// nodes pay for far fewer than `MAX_HEIGHT` slots.
pub const MAX_HEIGHT: usize = 20;

/// Precomputed cumulative height probabilities, so a single random draw
/// decides a new node's tower height. The per-level ratio is the inverse
/// of Euler's number.
const PROBABILITIES: [u32; MAX_HEIGHT] = {
  const P: f64 = 1.0 / core::f64::consts::E;

  let mut probabilities = [0; MAX_HEIGHT];
  let mut p = 1f64;

  let mut i = 0;
  while i < MAX_HEIGHT {
    probabilities[i] = ((u32::MAX as f64) * p) as u32;
    p *= P;
    i += 1;
  }

  probabilities
};

mod sync {
  #[cfg(not(loom))]
  pub(crate) use core::sync::atomic::*;

  #[cfg(loom)]
  pub(crate) use loom::sync::atomic::*;
}
