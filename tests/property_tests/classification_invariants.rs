//! Invariants of extraction and routing over generated streams

use crate::generators::{self, chunked, WireMessage};
use proptest::prelude::*;
use std::time::Instant;
use switchyard::buffer::ByteRing;
use switchyard::classifier::ClassifierConfig;
use switchyard::domain::{
    BufferCapacity, DestinationName, ExtractedMessage, RecordingDiagnostics,
};
use switchyard::extraction::InlineExtractor;
use switchyard::routing::{RecordingSink, Router};

fn extractor() -> InlineExtractor {
    InlineExtractor::new(
        BufferCapacity::try_new(64 * 1024).unwrap(),
        ClassifierConfig::default(),
    )
}

/// Feed `chunks` one read at a time with a frozen clock, then flush
fn classify(chunks: &[&[u8]]) -> Vec<ExtractedMessage> {
    let mut inline = extractor();
    let now = Instant::now();
    let mut messages = Vec::new();
    for chunk in chunks {
        assert!(inline.append(chunk));
        messages.extend(inline.extract(now).messages);
    }
    messages.extend(inline.flush(now).messages);
    messages
}

fn concat(messages: &[WireMessage]) -> Vec<u8> {
    messages.iter().flat_map(|m| m.bytes.clone()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_chunking_does_not_change_classification(
        messages in proptest::collection::vec(generators::message(), 1..24),
        first in generators::chunk_sizes(),
        second in generators::chunk_sizes(),
    ) {
        let stream = concat(&messages);
        let a = classify(&chunked(&stream, &first));
        let b = classify(&[&stream[..]]);
        let c = classify(&chunked(&stream, &second));

        prop_assert_eq!(a.len(), messages.len());
        for ((x, y), z) in a.iter().zip(&b).zip(&c) {
            prop_assert!(x.content_eq(y), "{:?} vs {:?}", x, y);
            prop_assert!(x.content_eq(z), "{:?} vs {:?}", x, z);
        }
        for (message, wire) in a.iter().zip(&messages) {
            prop_assert_eq!(&message.raw()[..], wire.raw());
        }
    }

    #[test]
    fn prop_prefix_is_never_consumed(
        wire in generators::message(),
        split in any::<prop::sample::Index>(),
    ) {
        let cut = 1 + split.index(wire.raw().len() - 1);
        let (head, tail) = wire.bytes.split_at(cut);

        let mut inline = extractor();
        let now = Instant::now();
        prop_assert!(inline.append(head));
        let batch = inline.extract(now);
        prop_assert!(batch.messages.is_empty());
        prop_assert_eq!(inline.ring().used_bytes(), head.len());
        prop_assert_eq!(&inline.ring().copy_out(head.len())[..], head);

        prop_assert!(inline.append(tail));
        let batch = inline.extract(now);
        prop_assert_eq!(batch.messages.len(), 1);
        prop_assert_eq!(&batch.messages[0].raw()[..], wire.raw());
        prop_assert!(inline.ring().is_empty());
    }

    #[test]
    fn prop_destination_order_survives_late_readiness(
        count in 1usize..60,
        ready_after in any::<prop::sample::Index>(),
        sizes in generators::chunk_sizes(),
    ) {
        let mut stream = b"`SCOPE Probe\r\n".to_vec();
        for n in 0..count {
            stream.extend_from_slice(format!("`Probe sample {n}\r\n").as_bytes());
        }

        let sink = RecordingSink::new();
        let mut router = Router::new(sink.clone(), sink.clone(), RecordingDiagnostics::new());
        let probe = DestinationName::try_new("Probe").unwrap();
        let ready_at = ready_after.index(count + 1);

        let mut inline = extractor();
        let now = Instant::now();
        let mut routed = 0;
        for chunk in chunked(&stream, &sizes) {
            prop_assert!(inline.append(chunk));
            for message in inline.extract(now).messages {
                router.route(message);
                routed += 1;
                if routed == ready_at + 1 {
                    router.set_ready(&probe);
                }
            }
        }
        if !router.is_ready(&probe) {
            router.set_ready(&probe);
        }

        let texts: Vec<String> = sink.routed_to(&probe).iter().map(|m| m.text()).collect();
        let expected: Vec<String> = (0..count).map(|n| format!("`Probe sample {n}")).collect();
        prop_assert_eq!(texts, expected);
    }

    #[test]
    fn prop_interleaved_destinations_keep_their_own_order(
        targets in proptest::collection::vec(any::<bool>(), 1..80),
        a_ready_at in any::<prop::sample::Index>(),
        sizes in generators::chunk_sizes(),
    ) {
        let mut stream = b"`TERM Alpha\r\n`SCOPE Beta\r\n".to_vec();
        for (n, to_alpha) in targets.iter().enumerate() {
            let name = if *to_alpha { "Alpha" } else { "Beta" };
            stream.extend_from_slice(format!("`{name} {n}\r\n").as_bytes());
        }

        let sink = RecordingSink::new();
        let mut router = Router::new(sink.clone(), sink.clone(), RecordingDiagnostics::new());
        let alpha = DestinationName::try_new("Alpha").unwrap();
        let beta = DestinationName::try_new("Beta").unwrap();
        router.set_ready(&beta);
        let ready_at = a_ready_at.index(targets.len() + 2);

        let mut inline = extractor();
        let now = Instant::now();
        let mut routed = 0;
        for chunk in chunked(&stream, &sizes) {
            prop_assert!(inline.append(chunk));
            for message in inline.extract(now).messages {
                router.route(message);
                routed += 1;
                if routed == ready_at {
                    router.set_ready(&alpha);
                }
            }
        }
        router.set_ready(&alpha);

        let expected = |want: bool, name: &str| -> Vec<String> {
            targets
                .iter()
                .enumerate()
                .filter(|(_, to_alpha)| **to_alpha == want)
                .map(|(n, _)| format!("`{name} {n}"))
                .collect()
        };
        let delivered = |dest: &DestinationName| -> Vec<String> {
            sink.routed_to(dest).iter().map(|m| m.text()).collect()
        };
        prop_assert_eq!(delivered(&alpha), expected(true, "Alpha"));
        prop_assert_eq!(delivered(&beta), expected(false, "Beta"));
    }
}
