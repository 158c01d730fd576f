#![no_std]
#![doc = include_str!("../README.md")]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod utils;

pub mod rcc;
pub mod regs;
pub mod time;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use rcc::{Config, Error, Flexgen};

pub(crate) mod _generated {
    #![allow(dead_code)]
    #![allow(unused_imports)]
    #![allow(non_snake_case)]
    #![allow(non_upper_case_globals)]
    #![allow(missing_docs)]
    #![allow(clippy::all)]

    include!(concat!(env!("OUT_DIR"), "/_generated.rs"));
}
