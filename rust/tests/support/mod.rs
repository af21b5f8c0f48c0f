#![allow(dead_code)]

mod helpers;
mod transports;

pub use helpers::*;
pub use transports::*;
