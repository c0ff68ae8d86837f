mod common;

use common::*;
use sketchwire::generate::{GenerationManager, GenerationStatus, Notice, SubmitOutcome};
use sketchwire::prompt::StaticPrompts;
use sketchwire::{Error, GenerationRequest, PromptCatalog};
use std::sync::Arc;

struct Harness {
    manager: GenerationManager,
    backend: Arc<ChannelBackend>,
    buffer: Arc<RecordingBuffer>,
    notifier: Arc<RecordingNotifier>,
    trigger: Arc<RecordingTrigger>,
}

fn harness_with(backend: ChannelBackend, catalog: PromptCatalog) -> Harness {
    let backend = Arc::new(backend);
    let buffer = Arc::new(RecordingBuffer::with_code("graph TD; old"));
    let notifier = Arc::new(RecordingNotifier::default());
    let trigger = Arc::new(RecordingTrigger::default());
    let manager = GenerationManager::new(
        backend.clone(),
        Arc::new(StaticPrompts(catalog)),
        buffer.clone(),
        notifier.clone(),
        trigger.clone(),
    );
    Harness {
        manager,
        backend,
        buffer,
        notifier,
        trigger,
    }
}

fn harness() -> Harness {
    harness_with(ChannelBackend::default(), PromptCatalog::new())
}

fn request(context: &str) -> GenerationRequest {
    GenerationRequest::new("sk-test", context, "mermaid")
}

#[tokio::test]
async fn streamed_code_updates_buffer_and_renders_once() {
    let h = harness();
    let outcome = h.manager.submit(request("login flow")).unwrap();
    assert!(matches!(outcome, SubmitOutcome::Started(_)));
    assert_eq!(h.manager.status(), GenerationStatus::Requesting);

    until(|| h.backend.opens().len() == 1).await;
    h.backend.send(0, "{\"code\":\"A\",\"done\":false}\n");
    until(|| h.buffer.history().len() == 2).await;
    assert_eq!(h.manager.status(), GenerationStatus::Streaming);
    assert!(h.trigger.renders().is_empty());

    h.backend.send(0, "{\"code\":\"AB\",\"done\":true}\n");
    h.manager.wait_idle().await;

    assert_eq!(h.buffer.history(), ["graph TD; old", "A", "AB"]);
    let renders = h.trigger.renders();
    assert_eq!(renders.len(), 1);
    assert_eq!(renders[0].text, "AB");
    assert_eq!(renders[0].diagram_type, "mermaid");
    assert_eq!(h.notifier.notices(), [Notice::Completed]);
}

#[tokio::test]
async fn error_record_fails_without_render() {
    let h = harness();
    h.manager.submit(request("x")).unwrap();
    until(|| h.backend.opens().len() == 1).await;

    h.backend.send(0, "{\"error\":\"quota exceeded\"}\n");
    h.manager.wait_idle().await;

    assert!(h.trigger.renders().is_empty());
    assert_eq!(h.buffer.history(), ["graph TD; old"]);
    let notices = h.notifier.notices();
    assert_eq!(notices.len(), 1);
    assert!(matches!(&notices[0], Notice::Failed(m) if m.contains("quota exceeded")));
}

#[tokio::test]
async fn malformed_line_stops_with_generic_report() {
    let h = harness();
    h.manager.submit(request("x")).unwrap();
    until(|| h.backend.opens().len() == 1).await;

    h.backend
        .send(0, "{\"code\":\"A\"}\n<html>proxy error</html>\n{\"code\":\"B\",\"done\":true}\n");
    h.manager.wait_idle().await;

    assert_eq!(h.buffer.history(), ["graph TD; old", "A"]);
    assert!(h.trigger.renders().is_empty());
    assert_eq!(
        h.notifier.notices(),
        [Notice::Failed(
            "could not decode the generation response".to_string()
        )]
    );
}

#[tokio::test]
async fn records_split_across_chunks_and_unterminated_tail() {
    let h = harness();
    h.manager.submit(request("x")).unwrap();
    until(|| h.backend.opens().len() == 1).await;

    h.backend.send(0, "{\"code\":\"gra");
    h.backend.send(0, "ph\"}\n{\"code\":\"graph TD\",");
    h.backend.send(0, "\"done\":true}");
    h.backend.close(0);
    h.manager.wait_idle().await;

    assert_eq!(h.buffer.history(), ["graph TD; old", "graph", "graph TD"]);
    assert_eq!(h.trigger.renders().len(), 1);
}

#[tokio::test]
async fn stream_ending_without_done_fails() {
    let h = harness();
    h.manager.submit(request("x")).unwrap();
    until(|| h.backend.opens().len() == 1).await;

    h.backend.send(0, "{\"code\":\"partial\"}\n");
    h.backend.close(0);
    h.manager.wait_idle().await;

    assert_eq!(h.buffer.history().last().map(String::as_str), Some("partial"));
    assert!(h.trigger.renders().is_empty());
    assert!(matches!(h.notifier.notices().as_slice(), [Notice::Failed(_)]));
}

#[tokio::test]
async fn transport_failure_during_read_fails() {
    let h = harness();
    h.manager.submit(request("x")).unwrap();
    until(|| h.backend.opens().len() == 1).await;

    h.backend.send_err(0, Error::transport("connection reset"));
    h.manager.wait_idle().await;
    assert!(matches!(
        h.notifier.notices().as_slice(),
        [Notice::Failed(m)] if m.contains("connection reset")
    ));
}

#[tokio::test]
async fn refused_open_fails() {
    let h = harness_with(
        ChannelBackend::refusing(Error::http_status(401, "Unauthorized")),
        PromptCatalog::new(),
    );
    h.manager.submit(request("x")).unwrap();
    h.manager.wait_idle().await;
    assert!(matches!(
        h.notifier.notices().as_slice(),
        [Notice::Failed(m)] if m.contains("401")
    ));
}

#[tokio::test]
async fn burst_of_submissions_opens_first_and_last_only() {
    let h = harness();
    assert!(matches!(
        h.manager.submit(request("first")).unwrap(),
        SubmitOutcome::Started(_)
    ));
    for context in ["second", "third", "last"] {
        assert_eq!(
            h.manager.submit(request(context)).unwrap(),
            SubmitOutcome::Queued
        );
    }
    assert!(h.manager.has_pending());

    until(|| h.backend.opens().len() == 1).await;
    h.backend.send(0, "{\"code\":\"1\",\"done\":true}\n");
    until(|| h.backend.opens().len() == 2).await;
    h.backend.send(1, "{\"code\":\"2\",\"done\":true}\n");
    h.manager.wait_idle().await;

    assert_eq!(h.backend.opens(), ["first", "last"]);
    assert_eq!(h.trigger.renders().len(), 2);
    assert!(!h.manager.has_pending());
}

#[tokio::test]
async fn supersede_aborts_before_next_stream_opens() {
    let h = harness();
    h.manager.submit(request("A")).unwrap();
    until(|| h.backend.opens().len() == 1).await;

    assert_eq!(
        h.manager.supersede(request("B")).unwrap(),
        SubmitOutcome::Superseding
    );
    until(|| h.backend.opens().len() == 2).await;

    assert_eq!(h.backend.journal.entries(), ["open A", "drop A", "open B"]);
    // Aborts are silent.
    assert!(h.notifier.notices().is_empty());

    h.backend.send(1, "{\"code\":\"B\",\"done\":true}\n");
    h.manager.wait_idle().await;
    assert_eq!(h.notifier.notices(), [Notice::Completed]);
}

#[tokio::test]
async fn supersede_when_idle_starts_immediately() {
    let h = harness();
    assert!(matches!(
        h.manager.supersede(request("A")).unwrap(),
        SubmitOutcome::Started(_)
    ));
    until(|| h.backend.opens().len() == 1).await;
}

#[tokio::test]
async fn cancel_clears_pending_and_aborts_silently() {
    let h = harness();
    h.manager.submit(request("A")).unwrap();
    h.manager.submit(request("B")).unwrap();
    until(|| h.backend.opens().len() == 1).await;

    assert!(h.manager.cancel());
    h.manager.wait_idle().await;

    assert_eq!(h.backend.opens(), ["A"]);
    assert!(h.notifier.notices().is_empty());
    assert!(h.trigger.renders().is_empty());
    assert!(!h.manager.cancel());
}

#[tokio::test]
async fn cancel_before_open_never_reaches_backend() {
    let h = harness();
    h.manager.submit(request("A")).unwrap();
    assert!(h.manager.cancel());
    h.manager.wait_idle().await;
    assert!(h.backend.opens().is_empty());
}

#[tokio::test]
async fn empty_key_or_context_is_rejected_before_network() {
    let h = harness();
    let err = h
        .manager
        .submit(GenerationRequest::new("", "draw a cat", "mermaid"))
        .unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    let err = h
        .manager
        .supersede(GenerationRequest::new("k", "   ", "mermaid"))
        .unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    assert_eq!(h.manager.status(), GenerationStatus::Idle);
    assert!(h.backend.opens().is_empty());
}

#[tokio::test]
async fn payload_carries_substituted_prompt() {
    let mut catalog = PromptCatalog::new();
    catalog.insert(
        "plantuml",
        "sequence",
        "Use {draw_tool_name} to draw a {draw_type}: {user_context}",
    );
    let h = harness_with(ChannelBackend::default(), catalog);

    let req = GenerationRequest::new("sk-test", "checkout", "plantuml").with_template_hint("sequence");
    h.manager.submit(req).unwrap();
    until(|| h.backend.opens().len() == 1).await;

    let payload = &h.backend.payloads()[0];
    assert_eq!(payload.api_key, "sk-test");
    assert_eq!(payload.prompt, "Use plantuml to draw a sequence: checkout");
    assert_eq!(payload.user_context, "checkout");
    assert_eq!(payload.draw_tool_name, "plantuml");
    assert_eq!(payload.draw_type, "sequence");
    assert!(h.manager.cancel());
}
