//! Public-key material for standard verification scripts.

pub mod keys;
