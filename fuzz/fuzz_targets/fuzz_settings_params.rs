// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![no_main]

use ddrpc_settings::wire::{
    decode_component_name, decode_component_values, decode_values, SetDataRequest,
    SettingsDataHeader,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Server-side parameter parsers
    let _ = decode_component_name(data);
    if let Ok(request) = SetDataRequest::decode(data) {
        let _ = request.encode();
    }

    // Client-side response parsers
    let _ = SettingsDataHeader::decode_le(data);
    let _ = decode_values(data);
    let _ = decode_component_values(data);
});
