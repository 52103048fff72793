#![allow(dead_code)]

pub mod signal;
