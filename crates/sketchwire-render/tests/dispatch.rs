mod common;

use common::*;
use sketchwire_core::{DiagramSource, Encoder, Error, plantuml_decode};
use sketchwire_render::{Method, PlantUmlServer, RenderOutcome, RenderPath};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test]
async fn local_capable_type_renders_locally_without_network() {
    let client = Arc::new(ScriptedClient::default());
    let local = Arc::new(CountingLocal::default());
    let renderer = renderer(settings(|_| {}), client.clone())
        .with_local_renderer("mermaid", local.clone());
    let sink = RecordingSink::default();

    let outcome = renderer
        .render(&DiagramSource::new("graph TD; A-->B", "mermaid"), &sink)
        .await;

    assert!(matches!(
        outcome,
        RenderOutcome::Rendered {
            path: RenderPath::Local
        }
    ));
    assert_eq!(local.calls.load(Ordering::SeqCst), 1);
    assert!(client.requests().is_empty());
    assert_eq!(
        sink.events(),
        [
            SinkEvent::Clear,
            SinkEvent::Loading("mermaid"),
            SinkEvent::Local("<div class=\"local\">graph TD; A-->B</div>".to_string()),
        ]
    );
}

#[tokio::test]
async fn forced_remote_bypasses_local_renderer() {
    let client = Arc::new(ScriptedClient::default().reply(200, svg("remote")));
    let local = Arc::new(CountingLocal::default());
    let renderer = renderer(settings(|s| s.force_remote = true), client.clone())
        .with_local_renderer("mermaid", local.clone());
    let sink = RecordingSink::default();

    let outcome = renderer
        .render(&DiagramSource::new("graph TD; A-->B", "mermaid"), &sink)
        .await;

    assert!(outcome.is_success());
    assert_eq!(local.calls.load(Ordering::SeqCst), 0);
    let requests = client.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::Post);
    assert_eq!(requests[0].url.as_str(), format!("{BASE}/mermaid/svg/"));
    assert_eq!(requests[0].content_type, Some("text/plain"));
    assert_eq!(requests[0].body.as_deref(), Some("graph TD; A-->B"));
}

#[tokio::test]
async fn local_type_without_registered_renderer_goes_remote() {
    let client = Arc::new(ScriptedClient::default().reply(200, svg("remote")));
    let renderer = renderer(settings(|_| {}), client.clone());
    let sink = RecordingSink::default();

    renderer
        .render(&DiagramSource::new("graph TD; A-->B", "mermaid"), &sink)
        .await;

    assert_eq!(client.requests().len(), 1);
    assert!(matches!(sink.last(), Some(SinkEvent::Svg(ref s)) if s.contains("remote")));
}

#[tokio::test]
async fn encoded_type_uses_get_with_url_safe_source() {
    let client = Arc::new(ScriptedClient::default().reply(200, svg("uml")));
    let renderer = renderer(settings(|s| s.force_remote = true), client.clone());
    let sink = RecordingSink::default();
    let text = "@startuml\nAlice -> Bob: 你好 ??? >>> ~~~\n@enduml";

    let outcome = renderer
        .render(&DiagramSource::new(text, "plantuml"), &sink)
        .await;
    assert!(outcome.is_success());

    let requests = client.requests();
    assert_eq!(requests.len(), 1);
    let req = &requests[0];
    assert_eq!(req.method, Method::Get);
    assert_eq!(req.accept, "image/svg+xml");
    assert!(req.body.is_none());

    let prefix = format!("{BASE}/plantuml/svg/");
    let url = req.url.as_str();
    assert!(url.starts_with(&prefix), "{url}");
    let encoded = req.url.path_segments().unwrap().next_back().unwrap();
    assert!(!encoded.contains(['+', '/', '=']));
    assert_eq!(Encoder::new().decode_compact(encoded).unwrap(), text);
    assert!(req.url.query().is_some_and(|q| q.starts_with("t=")));
}

#[tokio::test]
async fn plantuml_goes_to_its_own_server_unless_remote_is_forced() {
    let server_client = Arc::new(ScriptedClient::default().reply(200, svg("uml")));
    let service = Arc::new(ScriptedClient::default().reply(200, svg("kroki")));
    let store = settings(|_| {});
    let server = Arc::new(PlantUmlServer::new(server_client.clone()).unwrap());
    let renderer = renderer(store.clone(), service.clone()).with_local_renderer("plantuml", server);
    let sink = RecordingSink::default();
    let text = "@startuml\nAlice -> Bob: hi\n@enduml";

    let outcome = renderer
        .render(&DiagramSource::new(text, "plantuml"), &sink)
        .await;
    assert!(matches!(
        outcome,
        RenderOutcome::Rendered {
            path: RenderPath::Local
        }
    ));
    assert!(service.requests().is_empty());
    let requests = server_client.requests();
    assert_eq!(requests.len(), 1);
    let encoded = requests[0].url.path_segments().unwrap().next_back().unwrap();
    assert_eq!(plantuml_decode(encoded).unwrap(), text);
    assert!(matches!(sink.last(), Some(SinkEvent::Local(ref s)) if s.contains("uml")));

    store.update(|s| s.force_remote = true);
    renderer
        .render(&DiagramSource::new(text, "plantuml"), &sink)
        .await;
    assert_eq!(server_client.requests().len(), 1);
    assert_eq!(service.requests().len(), 1);
    assert!(matches!(sink.last(), Some(SinkEvent::Svg(ref s)) if s.contains("kroki")));
}

#[tokio::test]
async fn svg_failure_falls_back_to_png_once() {
    let client = Arc::new(
        ScriptedClient::default()
            .reply(502, b"Bad Gateway".to_vec())
            .reply(200, vec![0x89, b'P', b'N', b'G']),
    );
    let renderer = renderer(settings(|_| {}), client.clone());
    let sink = RecordingSink::default();

    let outcome = renderer
        .render(&DiagramSource::new("blockdiag { A -> B }", "blockdiag"), &sink)
        .await;

    assert!(matches!(
        outcome,
        RenderOutcome::PngFallback {
            error: Error::Transport {
                status: Some(502),
                ..
            }
        }
    ));
    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].url.as_str(), format!("{BASE}/blockdiag/png/"));
    assert_eq!(requests[1].accept, "image/png");
    assert_eq!(requests[1].body.as_deref(), Some("blockdiag { A -> B }"));

    let events = sink.events();
    assert!(matches!(events[2], SinkEvent::Error(ref m) if m.contains("502")));
    assert_eq!(
        events.last(),
        Some(&SinkEvent::Png(vec![0x89, b'P', b'N', b'G']))
    );
}

#[tokio::test]
async fn malformed_svg_also_falls_back() {
    let client = Arc::new(
        ScriptedClient::default()
            .reply(200, b"<html>maintenance</html>".to_vec())
            .reply(200, b"png".to_vec()),
    );
    let renderer = renderer(settings(|_| {}), client.clone());
    let sink = RecordingSink::default();

    let outcome = renderer
        .render(&DiagramSource::new("[A]->[B]", "nomnoml"), &sink)
        .await;
    assert!(matches!(
        outcome,
        RenderOutcome::PngFallback {
            error: Error::MalformedResponse { .. }
        }
    ));
}

#[tokio::test]
async fn failed_fallback_ends_with_error() {
    let client = Arc::new(
        ScriptedClient::default()
            .fail(Error::transport("connection reset"))
            .reply(500, Vec::new()),
    );
    let renderer = renderer(settings(|_| {}), client.clone());
    let sink = RecordingSink::default();

    let outcome = renderer
        .render(&DiagramSource::new("[A]->[B]", "nomnoml"), &sink)
        .await;
    assert!(matches!(
        outcome,
        RenderOutcome::Failed(Error::Transport {
            status: Some(500),
            ..
        })
    ));
    assert_eq!(client.requests().len(), 2);
    assert!(matches!(sink.last(), Some(SinkEvent::Error(_))));
}

#[tokio::test]
async fn configuration_errors_do_not_fall_back() {
    let client = Arc::new(ScriptedClient::default());
    let renderer = renderer(settings(|_| {}), client.clone())
        .with_encoder(Encoder::without_compression());
    let sink = RecordingSink::default();

    let outcome = renderer
        .render(&DiagramSource::new("@startuml\n@enduml", "plantuml"), &sink)
        .await;
    assert!(matches!(
        outcome,
        RenderOutcome::Failed(Error::Configuration { .. })
    ));
    assert!(client.requests().is_empty());

    let outcome = renderer
        .render(&DiagramSource::new("digraph {}", "graphviz"), &sink)
        .await;
    assert!(matches!(
        outcome,
        RenderOutcome::Failed(Error::UnknownDiagramType { .. })
    ));
    assert!(client.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn stale_response_is_discarded() {
    let client = Arc::new(
        ScriptedClient::default()
            .reply_after(Duration::from_millis(300), 200, svg("older"))
            .reply(200, svg("newer")),
    );
    let renderer = renderer(settings(|_| {}), client.clone());
    let sink = RecordingSink::default();

    let older = DiagramSource::new("A -> B", "blockdiag");
    let newer = DiagramSource::new("A -> C", "blockdiag");
    let (first, second) = tokio::join!(
        renderer.render(&older, &sink),
        renderer.render(&newer, &sink)
    );

    assert!(matches!(first, RenderOutcome::Superseded));
    assert!(second.is_success());
    assert_eq!(renderer.latest_sequence(), 2);

    let events = sink.events();
    assert!(matches!(events.last(), Some(SinkEvent::Svg(s)) if s.contains("newer")));
    assert!(
        !events
            .iter()
            .any(|e| matches!(e, SinkEvent::Svg(s) if s.contains("older")))
    );
}

#[tokio::test]
async fn box_and_line_svg_gets_viewport_controller() {
    let client = Arc::new(ScriptedClient::default().reply(
        200,
        br#"<svg width="900" height="700"><g/></svg>"#.to_vec(),
    ));
    let renderer = renderer(settings(|_| {}), client.clone());

    struct ViewportSink(std::sync::Mutex<Option<f64>>);
    impl sketchwire_render::RenderSink for ViewportSink {
        fn clear(&self) {}
        fn show_loading(&self, _: &sketchwire_core::DiagramType) {}
        fn show_error(&self, _: &Error) {}
        fn show_artifact(&self, artifact: sketchwire_render::RenderedArtifact) {
            if let sketchwire_render::RenderedArtifact::Svg {
                viewport: Some(controller),
                ..
            } = artifact
            {
                *self.0.lock().unwrap() = Some(controller.scale());
            }
        }
    }

    let sink = ViewportSink(std::sync::Mutex::new(None));
    renderer
        .render(&DiagramSource::new("seqdiag { A -> B }", "seqdiag"), &sink)
        .await;
    assert_eq!(*sink.0.lock().unwrap(), Some(1.0));
}
