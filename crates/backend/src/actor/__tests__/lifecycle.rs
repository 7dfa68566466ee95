//! Session lifecycle tests: activation handshakes, warm switches, resets and
//! project close.

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use pretty_assertions::assert_eq;
  use serde_json::json;

  use crate::{
    actor::{
      __tests__::helpers::{ScopeTestContext, wait_for},
      correlator::RequestError,
      message::HintRequest,
      session::SessionState,
    },
    domain::document::{DocumentSnapshot, EditChange, Offset},
    ipc::{Completion, Completions, FileInfoKind, WorkerEvent, WorkerRequest, wire_path},
  };

  fn completion(value: &str) -> Completion {
    Completion {
      value: value.to_string(),
      kind: Some("fn()".to_string()),
      depth: Some(0),
      guess: None,
      doc: None,
      url: None,
      origin: None,
    }
  }

  /// Cold-start a session on `src/main.js` that reads both files of `src/`,
  /// so directory expansion runs. Returns once the final re-prime was sent.
  async fn start_with_expansion(ctx: &mut ScopeTestContext) {
    ctx.add_file("src/main.js", "import { util } from './util';\nutil();\n");
    ctx.add_file("src/util.js", "export function util() {}\n");
    ctx.open_project().await;

    let main = ctx.doc("src/main.js");
    ctx.handle.on_active_editor_changed(main.clone(), None).await.unwrap();
    ctx.worker.expect(|m| matches!(m, WorkerRequest::PrimePump { .. })).await;

    for name in ["src/main.js", "src/util.js"] {
      ctx.worker.emit(WorkerEvent::GetFile { file: ctx.wire(name) }).await;
    }
    for _ in 0..2 {
      ctx.worker.expect(|m| matches!(m, WorkerRequest::GetFile { .. })).await;
    }
    ctx.worker.primed(&main.path).await;
    ctx.wait_ready().await;
    ctx.worker.expect(|m| matches!(m, WorkerRequest::PrimePump { .. })).await;
  }

  // ==========================================================================
  // Cold activation
  // ==========================================================================

  #[tokio::test]
  async fn test_cold_activation_handshake() {
    let mut ctx = ScopeTestContext::new().await;
    ctx.add_file("src/main.js", "import { util } from './util';\nutil();\n");
    ctx.add_file("src/util.js", "export function util() {}\n");
    ctx.add_file("src/styles.css", "body {}\n");
    ctx.add_file("src/lib/extra.js", "var extra = 1;\n");
    ctx.open_project().await;

    let main = ctx.doc("src/main.js");
    ctx.handle.on_active_editor_changed(main.clone(), None).await.unwrap();

    assert!(matches!(ctx.worker.next().await, WorkerRequest::SetConfig { .. }));
    assert_eq!(
      ctx.worker.next().await,
      WorkerRequest::Init {
        dir: ctx.wire("src"),
        files: vec![ctx.wire("src/main.js"), ctx.wire("src/util.js")],
        env: vec![],
        timeout: 30_000,
      }
    );
    assert_eq!(
      ctx.worker.next().await,
      WorkerRequest::PrimePump {
        path: ctx.wire("src/main.js"),
        is_untitled: false,
      }
    );

    // The worker reads both files before it finishes priming
    for name in ["src/main.js", "src/util.js"] {
      ctx.worker.emit(WorkerEvent::GetFile { file: ctx.wire(name) }).await;
    }
    let mut served = Vec::new();
    for _ in 0..2 {
      match ctx.worker.next().await {
        WorkerRequest::GetFile { file, text } => served.push((file, text)),
        other => panic!("expected GET_FILE, got {other:?}"),
      }
    }
    served.sort();
    assert_eq!(
      served,
      vec![
        (ctx.wire("src/main.js"), main.text.to_string()),
        (ctx.wire("src/util.js"), "export function util() {}\n".to_string()),
      ]
    );

    ctx.worker.primed(&main.path).await;
    assert_eq!(ctx.wait_ready().await, 1);

    // Expansion feeds the subdirectory, walks the project root, then re-primes
    assert_eq!(
      ctx.worker.next().await,
      WorkerRequest::AddFiles {
        files: vec![ctx.wire("src/lib/extra.js")],
      }
    );
    assert_eq!(
      ctx.worker.next().await,
      WorkerRequest::PrimePump {
        path: ctx.wire("src/main.js"),
        is_untitled: false,
      }
    );

    let handle = ctx.handle.clone();
    assert!(
      wait_for(Duration::from_secs(2), || {
        let handle = handle.clone();
        async move { handle.status().await.is_ok_and(|s| s.session.is_some_and(|s| !s.expanding)) }
      })
      .await,
      "expansion should finish"
    );
    let session = ctx.handle.status().await.unwrap().session.unwrap();
    assert_eq!(session.state, SessionState::Ready);
    assert_eq!((session.initial_files, session.resolved_files, session.added_files), (2, 2, 1));
    assert!(!session.using_modules);
    assert!(!session.limit_reached);
  }

  #[tokio::test]
  async fn test_untitled_activation() {
    let mut ctx = ScopeTestContext::new().await;
    ctx.open_project().await;

    let doc = DocumentSnapshot::new(ctx.path("Untitled-1.js"), "var a = 1;").untitled();
    ctx.handle.on_active_editor_changed(doc.clone(), None).await.unwrap();

    assert!(matches!(ctx.worker.next().await, WorkerRequest::SetConfig { .. }));
    assert_eq!(
      ctx.worker.next().await,
      WorkerRequest::Init {
        dir: wire_path(ctx.project.path()),
        files: vec![],
        env: vec![],
        timeout: 30_000,
      }
    );
    assert_eq!(
      ctx.worker.next().await,
      WorkerRequest::PrimePump {
        path: ctx.wire("Untitled-1.js"),
        is_untitled: true,
      }
    );

    ctx.worker.primed(&doc.path).await;
    ctx.wait_ready().await;
    ctx.worker.assert_quiet().await;
  }

  #[tokio::test]
  async fn test_worker_config_sent_on_first_start() {
    let mut ctx = ScopeTestContext::new().await;
    ctx.add_file("main.js", "main();\n");

    ctx.handle.set_worker_config(json!({ "plugins": ["node"] })).await.unwrap();
    ctx.worker.assert_quiet().await;

    ctx.open_project().await;
    ctx.handle.on_active_editor_changed(ctx.doc("main.js"), None).await.unwrap();
    assert_eq!(
      ctx.worker.next().await,
      WorkerRequest::SetConfig {
        config: json!({ "plugins": ["node"] }),
      }
    );
  }

  #[tokio::test]
  async fn test_listing_failure_inits_without_files() {
    let mut ctx = ScopeTestContext::new().await;
    ctx.add_file("src/main.js", "main();\n");
    ctx.fs.fail_listing(ctx.path("src"));
    ctx.open_project().await;

    ctx.handle.on_active_editor_changed(ctx.doc("src/main.js"), None).await.unwrap();
    let init = ctx.worker.expect(|m| matches!(m, WorkerRequest::Init { .. })).await;
    assert!(matches!(init, WorkerRequest::Init { files, .. } if files.is_empty()));
    assert!(matches!(ctx.worker.next().await, WorkerRequest::PrimePump { .. }));
  }

  // ==========================================================================
  // Warm activation
  // ==========================================================================

  #[tokio::test]
  async fn test_warm_activation_flushes_previous_before_priming() {
    let mut ctx = ScopeTestContext::new().await;
    start_with_expansion(&mut ctx).await;

    let edited = DocumentSnapshot::new(ctx.path("src/main.js"), "xutil();\n").with_dirty(true);
    let util = ctx.doc("src/util.js");
    ctx
      .handle
      .on_buffer_edited(vec![EditChange::new(Offset::new(0, 0), Offset::new(0, 0), "x")])
      .await
      .unwrap();
    ctx
      .handle
      .on_active_editor_changed(util.clone(), Some(edited.clone()))
      .await
      .unwrap();

    let handle = ctx.handle.clone();
    let request = {
      let util = util.clone();
      tokio::spawn(async move { handle.request_completions(util, Offset::new(0, 3), false).await })
    };

    assert_eq!(
      ctx.worker.next().await,
      WorkerRequest::UpdateFile {
        path: ctx.wire("src/main.js"),
        text: "xutil();\n".to_string(),
      }
    );
    assert_eq!(ctx.handle.status().await.unwrap().session.unwrap().state, SessionState::Flushing);

    ctx
      .worker
      .emit(WorkerEvent::UpdateFile {
        path: ctx.wire("src/main.js"),
      })
      .await;
    assert_eq!(
      ctx.worker.next().await,
      WorkerRequest::PrimePump {
        path: ctx.wire("src/util.js"),
        is_untitled: false,
      }
    );

    match ctx.worker.next().await {
      WorkerRequest::Completions { file_info, offset, .. } => {
        assert_eq!(file_info.name, ctx.wire("src/util.js"));
        assert_eq!(file_info.kind, FileInfoKind::Empty);
        assert_eq!(offset, Offset::new(0, 3));
      }
      other => panic!("expected COMPLETIONS, got {other:?}"),
    }
    ctx
      .worker
      .emit(WorkerEvent::Completions {
        file: ctx.wire("src/util.js"),
        offset: Offset::new(0, 3),
        completions: Some(vec![completion("util")]),
        properties: None,
        error: None,
      })
      .await;

    assert_eq!(
      request.await.unwrap(),
      Ok(Completions::Hints(vec![completion("util")]))
    );
    assert_eq!(ctx.handle.status().await.unwrap().sessions_created, 1);
  }

  #[tokio::test]
  async fn test_warm_activation_without_edits_stays_ready() {
    let mut ctx = ScopeTestContext::new().await;
    start_with_expansion(&mut ctx).await;

    let main = ctx.doc("src/main.js");
    ctx
      .handle
      .on_active_editor_changed(ctx.doc("src/util.js"), Some(main))
      .await
      .unwrap();

    ctx.worker.assert_quiet().await;
    let status = ctx.handle.status().await.unwrap();
    assert_eq!(status.session.unwrap().state, SessionState::Ready);
    assert_eq!(status.sessions_created, 1);
  }

  // ==========================================================================
  // Reset
  // ==========================================================================

  #[tokio::test]
  async fn test_reset_after_hint_limit_is_single_flight() {
    let mut ctx = ScopeTestContext::with_config("[lifecycle]\nmax_hints_before_reset = 2\n").await;
    ctx.add_file("main.js", "var a = 1;\na.\n");
    ctx.start_session("main.js").await;
    let doc = ctx.doc("main.js");

    let mut replies = Vec::new();
    for ch in 0..2 {
      replies.push(
        ctx
          .handle
          .submit(HintRequest::Completions { is_property: false }, doc.clone(), Offset::new(1, ch))
          .await
          .unwrap(),
      );
    }
    let status = ctx.handle.status().await.unwrap();
    assert_eq!((status.hint_count, status.sessions_created), (2, 1));
    assert!(!status.reset_in_progress);

    replies.push(
      ctx
        .handle
        .submit(HintRequest::Completions { is_property: false }, doc.clone(), Offset::new(1, 2))
        .await
        .unwrap(),
    );
    let status = ctx.handle.status().await.unwrap();
    assert!(status.reset_in_progress);
    assert_eq!(status.warming, Some(2));
    assert_eq!((status.hint_count, status.sessions_created), (0, 2));

    // Everything during the reset joins it
    let handle = ctx.handle.clone();
    let joined = {
      let doc = doc.clone();
      tokio::spawn(async move { handle.reset(doc, false).await })
    };
    replies.push(
      ctx
        .handle
        .submit(HintRequest::Completions { is_property: false }, doc.clone(), Offset::new(1, 3))
        .await
        .unwrap(),
    );
    let status = ctx.handle.status().await.unwrap();
    assert_eq!((status.hint_count, status.sessions_created), (0, 2));

    ctx.worker.expect(|m| matches!(m, WorkerRequest::Reset)).await;
    ctx.worker.expect(|m| matches!(m, WorkerRequest::PrimePump { .. })).await;
    ctx.worker.primed(&doc.path).await;

    assert_eq!(joined.await.unwrap(), Ok(2));
    let status = ctx.handle.status().await.unwrap();
    assert_eq!(status.session.map(|s| s.id), Some(2));
    assert_eq!(status.warming, None);
    assert!(!status.reset_in_progress);
    assert_eq!(status.pending_requests, 4);
  }

  #[tokio::test]
  async fn test_forced_reset() {
    let mut ctx = ScopeTestContext::new().await;
    ctx.add_file("main.js", "main();\n");
    ctx.start_session("main.js").await;
    let doc = ctx.doc("main.js");

    let handle = ctx.handle.clone();
    let reset = tokio::spawn(async move { handle.reset(doc, true).await });

    assert_eq!(ctx.worker.next_names(3).await, vec!["RESET", "INIT", "PRIME_PUMP"]);
    ctx.worker.primed(&ctx.path("main.js")).await;
    assert_eq!(reset.await.unwrap(), Ok(2));
  }

  #[tokio::test]
  async fn test_reset_during_pending_prime_primes_new_session() {
    let mut ctx = ScopeTestContext::new().await;
    ctx.add_file("main.js", "main();\n");
    ctx.open_project().await;

    let doc = ctx.doc("main.js");
    ctx.handle.on_active_editor_changed(doc.clone(), None).await.unwrap();
    ctx.worker.expect(|m| matches!(m, WorkerRequest::PrimePump { .. })).await;

    // The first prime is never answered
    let handle = ctx.handle.clone();
    let reset = {
      let doc = doc.clone();
      tokio::spawn(async move { handle.reset(doc, true).await })
    };
    assert_eq!(ctx.worker.next_names(3).await, vec!["RESET", "INIT", "PRIME_PUMP"]);

    let status = ctx.handle.status().await.unwrap();
    assert_eq!(status.warming, Some(2));
    assert!(status.reset_in_progress);
    assert_eq!(status.pending_requests, 1);
    assert!(!reset.is_finished());

    ctx.worker.primed(&doc.path).await;
    assert_eq!(reset.await.unwrap(), Ok(2));
    let status = ctx.handle.status().await.unwrap();
    assert_eq!(status.session.map(|s| (s.id, s.state)), Some((2, SessionState::Ready)));
    assert_eq!(status.pending_requests, 0);
  }

  #[tokio::test]
  async fn test_reset_resends_pending_flush() {
    let mut ctx = ScopeTestContext::new().await;
    ctx.add_file("main.js", "main();\n");
    ctx.add_file("other/other.js", "other();\n");
    ctx.start_session("main.js").await;

    // A dirty document left behind on a cold switch is flushed, then the
    // new session resets the worker before that flush is answered
    let edited = DocumentSnapshot::new(ctx.path("main.js"), "main(1);\n").with_dirty(true);
    let other = ctx.doc("other/other.js");
    ctx
      .handle
      .on_active_editor_changed(other.clone(), Some(edited.clone()))
      .await
      .unwrap();
    assert_eq!(ctx.worker.next_names(2).await, vec!["UPDATE_FILE", "RESET"]);
    assert_eq!(ctx.worker.next_names(2).await, vec!["INIT", "PRIME_PUMP"]);

    let status = ctx.handle.status().await.unwrap();
    assert_eq!(status.pending_requests, 1);

    ctx.worker.primed(&other.path).await;
    ctx.wait_ready().await;

    // Back to main.js, then away from it with the same unsaved text: the
    // flush reaches the worker instead of joining the discarded request
    let main = ctx.doc("main.js");
    ctx.handle.on_active_editor_changed(main.clone(), Some(other)).await.unwrap();
    ctx.worker.expect(|m| matches!(m, WorkerRequest::PrimePump { .. })).await;
    ctx.worker.primed(&main.path).await;
    ctx.wait_ready().await;

    ctx
      .handle
      .on_active_editor_changed(ctx.doc("other/other.js"), Some(edited))
      .await
      .unwrap();
    assert_eq!(
      ctx.worker.next().await,
      WorkerRequest::UpdateFile {
        path: ctx.wire("main.js"),
        text: "main(1);\n".to_string(),
      }
    );
  }

  #[tokio::test]
  async fn test_reset_without_session_is_unavailable() {
    let ctx = ScopeTestContext::new().await;
    let doc = DocumentSnapshot::new(ctx.path("main.js"), "");
    assert_eq!(ctx.handle.reset(doc, true).await, Err(RequestError::Unavailable));
  }

  #[tokio::test]
  async fn test_cold_activation_abandons_warming_session() {
    let mut ctx = ScopeTestContext::new().await;
    ctx.add_file("main.js", "main();\n");
    ctx.add_file("other/other.js", "other();\n");
    ctx.start_session("main.js").await;

    let handle = ctx.handle.clone();
    let doc = ctx.doc("main.js");
    let reset = tokio::spawn(async move { handle.reset(doc, true).await });

    let handle = ctx.handle.clone();
    assert!(
      wait_for(Duration::from_secs(2), || {
        let handle = handle.clone();
        async move { handle.status().await.is_ok_and(|s| s.warming.is_some()) }
      })
      .await
    );

    let other = ctx.doc("other/other.js");
    ctx
      .handle
      .on_active_editor_changed(other.clone(), Some(ctx.doc("main.js")))
      .await
      .unwrap();
    let other_wire = ctx.wire("other/other.js");
    ctx
      .worker
      .expect(|m| matches!(m, WorkerRequest::PrimePump { path, .. } if *path == other_wire))
      .await;
    ctx.worker.primed(&other.path).await;

    assert_eq!(reset.await.unwrap(), Ok(3));
    let status = ctx.handle.status().await.unwrap();
    assert_eq!(status.warming, None);
    assert_eq!(status.session.map(|s| s.id), Some(3));
  }

  // ==========================================================================
  // Project close & dirty flags
  // ==========================================================================

  #[tokio::test]
  async fn test_dirty_flag_forwarded() {
    let mut ctx = ScopeTestContext::new().await;
    ctx.add_file("main.js", "main();\n");
    ctx.start_session("main.js").await;

    ctx.handle.update_dirty_flag(ctx.path("main.js"), true).await.unwrap();
    assert_eq!(
      ctx.worker.next().await,
      WorkerRequest::UpdateDirtyFile {
        name: ctx.wire("main.js"),
        action: true,
      }
    );
  }

  #[tokio::test]
  async fn test_project_close_clears_dirty_files_then_resets() {
    let mut ctx = ScopeTestContext::new().await;
    ctx.add_file("main.js", "main();\n");
    ctx.start_session("main.js").await;

    ctx.handle.on_project_closed().await.unwrap();
    assert_eq!(ctx.worker.next().await, WorkerRequest::ClearDirtyFiles);
    assert_eq!(ctx.worker.next().await, WorkerRequest::Reset);

    let status = ctx.handle.status().await.unwrap();
    assert!(status.session.is_none());

    let result = ctx
      .handle
      .request_completions(ctx.doc("main.js"), Offset::new(0, 1), false)
      .await;
    assert_eq!(result, Err(RequestError::Unavailable));
  }

  #[tokio::test]
  async fn test_shutdown_cancels_pending_requests() {
    let mut ctx = ScopeTestContext::new().await;
    ctx.add_file("main.js", "main();\n");
    ctx.start_session("main.js").await;

    let reply = ctx
      .handle
      .submit(HintRequest::ScopeData, ctx.doc("main.js"), Offset::new(0, 2))
      .await
      .unwrap();
    ctx.handle.shutdown().await.unwrap();
    assert_eq!(reply.await, Err(RequestError::Cancelled));
  }
}
