//! Seeding tests: directory expansion after priming and the file-count cap.

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use pretty_assertions::assert_eq;

  use crate::{
    actor::__tests__::helpers::{ScopeTestContext, wait_for},
    domain::document::DocumentSnapshot,
    ipc::{WorkerEvent, WorkerRequest},
  };

  async fn wait_expansion_done(ctx: &ScopeTestContext) {
    let handle = ctx.handle.clone();
    assert!(
      wait_for(Duration::from_secs(2), || {
        let handle = handle.clone();
        async move { handle.status().await.is_ok_and(|s| s.session.is_some_and(|s| !s.expanding)) }
      })
      .await,
      "expansion should finish"
    );
  }

  #[tokio::test]
  async fn test_seeding_stops_at_file_cap() {
    let mut ctx = ScopeTestContext::with_config("[limits]\nmax_file_count = 3\n").await;
    ctx.add_file("web/index.html", "<script>var page = 1;</script>\n");
    for i in 0..10 {
      ctx.add_file(&format!("web/lib/f{i}.js"), "var f = 1;\n");
    }
    ctx.open_project().await;

    let page = DocumentSnapshot::new(ctx.path("web/index.html"), "var page = 1;\n").embedded();
    ctx.handle.on_active_editor_changed(page.clone(), None).await.unwrap();

    assert_eq!(ctx.worker.next().await.name(), "SET_CONFIG");
    assert_eq!(
      ctx.worker.next().await,
      WorkerRequest::Init {
        dir: ctx.wire("web"),
        files: vec![],
        env: vec![],
        timeout: 30_000,
      }
    );
    assert_eq!(ctx.worker.next().await.name(), "PRIME_PUMP");
    ctx.worker.primed(&page.path).await;
    ctx.wait_ready().await;

    assert_eq!(
      ctx.worker.next().await,
      WorkerRequest::AddFiles {
        files: vec![ctx.wire("web/lib/f0.js"), ctx.wire("web/lib/f1.js"), ctx.wire("web/lib/f2.js")],
      }
    );
    // The project-root walk is cut short; only the re-prime follows
    assert_eq!(
      ctx.worker.next().await,
      WorkerRequest::PrimePump {
        path: ctx.wire("web/index.html"),
        is_untitled: false,
      }
    );
    ctx.worker.assert_quiet().await;

    wait_expansion_done(&ctx).await;
    let session = ctx.handle.status().await.unwrap().session.unwrap();
    assert_eq!(session.added_files, 3);
    assert!(session.limit_reached);
  }

  #[tokio::test]
  async fn test_expansion_skips_excluded_and_covered_directories() {
    let mut ctx = ScopeTestContext::new().await;
    ctx.add_file("src/main.js", "main();\n");
    ctx.add_file("src/lib/a.js", "var a;\n");
    ctx.add_file("src/node_modules/dep/index.js", "module.exports = {};\n");
    ctx.add_file("src/lib/jquery.min.js", "/* vendored */\n");
    ctx.add_file("root.js", "var root;\n");
    ctx.add_file("tools/build.js", "build();\n");
    ctx.add_file(".cache/cached.js", "cached();\n");
    ctx.open_project().await;

    let main = ctx.doc("src/main.js");
    ctx.handle.on_active_editor_changed(main.clone(), None).await.unwrap();
    ctx.worker.expect(|m| matches!(m, WorkerRequest::PrimePump { .. })).await;
    ctx.worker.emit(WorkerEvent::GetFile { file: ctx.wire("src/main.js") }).await;
    ctx.worker.expect(|m| matches!(m, WorkerRequest::GetFile { .. })).await;
    ctx.worker.primed(&main.path).await;
    ctx.wait_ready().await;

    let mut added = Vec::new();
    loop {
      match ctx.worker.next().await {
        WorkerRequest::AddFiles { files } => added.extend(files),
        WorkerRequest::PrimePump { path, .. } => {
          assert_eq!(path, ctx.wire("src/main.js"));
          break;
        }
        other => panic!("unexpected message during expansion: {other:?}"),
      }
    }
    assert_eq!(
      added,
      vec![ctx.wire("src/lib/a.js"), ctx.wire("root.js"), ctx.wire("tools/build.js")]
    );

    wait_expansion_done(&ctx).await;
    let session = ctx.handle.status().await.unwrap().session.unwrap();
    assert_eq!((session.initial_files, session.resolved_files, session.added_files), (1, 1, 3));
  }

  #[tokio::test]
  async fn test_module_projects_skip_expansion() {
    let mut ctx = ScopeTestContext::new().await;
    ctx.add_file("src/main.js", "require('dep');\n");
    ctx.add_file("src/lib/a.js", "var a;\n");
    ctx.open_project().await;

    let main = ctx.doc("src/main.js");
    ctx.handle.on_active_editor_changed(main.clone(), None).await.unwrap();
    ctx.worker.expect(|m| matches!(m, WorkerRequest::PrimePump { .. })).await;

    // One file seeded, two read: the worker follows imports on its own
    for name in ["src/main.js", "src/lib/a.js"] {
      ctx.worker.emit(WorkerEvent::GetFile { file: ctx.wire(name) }).await;
    }
    for _ in 0..2 {
      ctx.worker.expect(|m| matches!(m, WorkerRequest::GetFile { .. })).await;
    }
    ctx.worker.primed(&main.path).await;
    ctx.wait_ready().await;

    ctx.worker.assert_quiet().await;
    let session = ctx.handle.status().await.unwrap().session.unwrap();
    assert!(session.using_modules);
    assert_eq!(session.added_files, 0);
  }
}
