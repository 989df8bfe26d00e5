#![no_main]
use keelson::protocol::wire::{decode_all, NamedFieldDecoder, StatisticsDecoder};
use libfuzzer_sys::fuzz_target;

// The recursive named-field tree is the deepest parser in the codec; feed it
// raw and string-wrapped garbage.
fuzz_target!(|data: &[u8]| {
    let _ = decode_all::<NamedFieldDecoder>(data);
    let _ = decode_all::<StatisticsDecoder>(data);
});
