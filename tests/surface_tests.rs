use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use gemini_live_rs::{
    EventKind, EventRegistry, LiveConfig, LiveEvent, LiveSession, MediaChunk, ResponseModality,
};

#[test]
fn builder_chain_compiles() {
    let _ = LiveSession::builder()
        .on(EventKind::Open, |_| {})
        .on(EventKind::Interrupted, |_| {})
        .on(EventKind::Close, |_| {});
}

#[test]
fn config_builder_composes() {
    let config = LiveConfig::new("models/gemini-2.0-flash-exp")
        .response_modality(ResponseModality::Audio)
        .voice("Aoede")
        .system_instruction("Answer briefly.");

    let generation = config.generation_config.expect("generation config");
    assert_eq!(generation.response_modalities, ResponseModality::Audio);
    assert_eq!(
        generation
            .speech_config
            .expect("speech config")
            .voice_config
            .prebuilt_voice_config
            .voice_name,
        "Aoede"
    );
    assert!(config.system_instruction.is_some());
}

#[test]
fn registry_dispatches_in_registration_order_across_kinds() {
    let registry = EventRegistry::new();
    let audio_hits = Arc::new(AtomicUsize::new(0));
    let interrupt_hits = Arc::new(AtomicUsize::new(0));

    let counter = Arc::clone(&audio_hits);
    registry.on(EventKind::Audio, move |event| {
        assert!(matches!(event, LiveEvent::Audio(_)));
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = Arc::clone(&interrupt_hits);
    registry.on(EventKind::Interrupted, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    registry.emit(&LiveEvent::Audio(vec![0, 0]));
    registry.emit(&LiveEvent::Audio(vec![1, 1]));
    registry.emit(&LiveEvent::Interrupted);

    assert_eq!(audio_hits.load(Ordering::SeqCst), 2);
    assert_eq!(interrupt_hits.load(Ordering::SeqCst), 1);
}

#[test]
fn media_chunk_constructors_pick_mime_types() {
    let audio = MediaChunk::audio(&[0u8; 64]);
    assert!(audio.is_audio());
    assert!(!audio.is_image());
    assert_eq!(audio.interrupt, None);

    let frame = MediaChunk::jpeg(&[0xFF, 0xD8]);
    assert!(frame.is_image());
    assert!(!frame.is_audio());

    let tagged = MediaChunk::audio(&[0u8; 2]).with_interrupt();
    assert_eq!(tagged.interrupt, Some(true));
}

#[test]
fn event_kinds_cover_every_event() {
    assert_eq!(LiveEvent::Open.kind(), EventKind::Open);
    assert_eq!(LiveEvent::SetupComplete.kind(), EventKind::SetupComplete);
    assert_eq!(LiveEvent::Audio(Vec::new()).kind(), EventKind::Audio);
    assert_eq!(LiveEvent::Interrupted.kind(), EventKind::Interrupted);
    assert_eq!(LiveEvent::TurnComplete.kind(), EventKind::TurnComplete);
    assert_eq!(
        LiveEvent::Close { code: Some(1000) }.kind(),
        EventKind::Close
    );
}
