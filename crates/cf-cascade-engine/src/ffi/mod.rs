#![allow(unreachable_pub)]

pub mod bridge;

#[cfg(feature = "libtorrent")]
#[allow(unsafe_code)]
#[allow(clippy::non_send_fields_in_send_ty)]
// SAFETY: the C++ session wrapper is created on the worker task's own thread
// and never shared concurrently; it is only ever driven from that one task.
unsafe impl Send for bridge::ffi::Session {}
