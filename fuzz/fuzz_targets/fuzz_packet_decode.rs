// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use ddrpc::protocol::{Packet, RequestHeader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Anything that decodes must survive a re-encode
    if let Ok(packet) = Packet::decode(data) {
        let bytes = packet.to_bytes();
        assert_eq!(Packet::decode(&bytes).ok(), Some(packet));
    }

    let _ = RequestHeader::decode_le(data);
});
