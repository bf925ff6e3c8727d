#![no_main]

use adl_core::decision::decision_struct_hash;
use adl_core::DecisionSubmission;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(submission) = serde_json::from_slice::<DecisionSubmission>(data) else {
        return;
    };

    // Whatever parses must re-encode to an equal payload with an identical struct hash.
    let encoded = serde_json::to_vec(&submission).expect("encode parsed submission");
    let reparsed: DecisionSubmission =
        serde_json::from_slice(&encoded).expect("decode re-encoded submission");
    assert_eq!(reparsed, submission);
    assert_eq!(decision_struct_hash(&reparsed), decision_struct_hash(&submission));
});
