#![no_main]
use keelson::protocol::wire::{
    BytesDecoder, Decoder, ListDecoder, OptionDecoder, PairDecoder, Step,
};
use keelson::protocol::ResponseDecoder;
use libfuzzer_sys::fuzz_target;

// Arbitrary bytes must never panic the response parser, in one gulp or fed
// byte by byte.
fuzz_target!(|data: &[u8]| {
    let mut decoder =
        ResponseDecoder::<ListDecoder<PairDecoder<BytesDecoder, OptionDecoder<BytesDecoder>>>>::default();
    let mut input = data;
    let _ = decoder.step(&mut input);

    let mut decoder = ResponseDecoder::<BytesDecoder>::default();
    for byte in data {
        let mut input = std::slice::from_ref(byte);
        match decoder.step(&mut input) {
            Ok(Step::Need(_)) => {}
            Ok(Step::Done(_)) | Err(_) => break,
        }
    }
});
