//! Firmware Site - Vendor firmware distribution endpoint
//! Key management, block-chunked RSA encryption, detached signatures and update packaging

pub mod engine;
