#![cfg(all(feature = "rust-crypto", feature = "rcgen"))]

mod common;

mod handshake;
mod retransmit;
mod transport;
