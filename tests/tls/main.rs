#![cfg(all(feature = "rust-crypto", feature = "rcgen"))]

mod common;

mod alerts;
mod extensions;
mod handshake;
mod stream;
mod tls13;
