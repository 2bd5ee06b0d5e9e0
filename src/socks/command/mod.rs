//! SOCKS5 request/reply wire format
//!
//! Handles parsing SOCKS5 requests and building replies.

mod parser;
mod reply;

pub use parser::{read_addr_spec, read_request_header};
pub use reply::{encode_reply, send_command_not_supported, send_reply};
