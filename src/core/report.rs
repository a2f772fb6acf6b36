//! 计数与输出

use crate::core::executor::{ActionKind, ActionOutcome};
use crate::core::planner::SyncDecision;
use crate::error::SyncError;
use crate::storage::ContainerDetails;
use std::fmt::Display;
use std::io::{self, Write};
use tracing::warn;

/// 本次运行的计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub created: u64,
    /// 上传总数（包含新建）
    pub uploaded: u64,
    pub skipped: u64,
    pub deleted: u64,
    pub failed: u64,
}

impl RunCounters {
    pub fn update_count(&self) -> u64 {
        self.uploaded.saturating_sub(self.created)
    }
}

/// 汇总输出
///
/// 只读取决策和执行结果，不产生任何远程副作用。
pub struct Reporter {
    verbosity: u8,
    dry_run: bool,
    counters: RunCounters,
    errors: Vec<SyncError>,
    out: Box<dyn Write + Send>,
}

impl Reporter {
    pub fn new(verbosity: u8, dry_run: bool) -> Self {
        Self::with_writer(verbosity, dry_run, Box::new(io::stdout()))
    }

    pub fn with_writer(verbosity: u8, dry_run: bool, out: Box<dyn Write + Send>) -> Self {
        Self {
            verbosity,
            dry_run,
            counters: RunCounters::default(),
            errors: Vec::new(),
            out,
        }
    }

    pub fn verbosity(&self) -> u8 {
        self.verbosity
    }

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    /// 输出一行（verbosity 0 时静默）
    pub fn line(&mut self, message: impl Display) {
        if self.verbosity > 0 {
            let _ = writeln!(self.out, "{}", message);
        }
    }

    /// 仅在 verbosity > 1 时输出
    pub fn verbose(&mut self, message: impl Display) {
        if self.verbosity > 1 {
            let _ = writeln!(self.out, "{}", message);
        }
    }

    /// 记录一个决策的执行结果
    pub fn record(&mut self, decision: &SyncDecision, result: Result<ActionOutcome, SyncError>) {
        let name = decision.object_name();
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                self.record_failure(name, err);
                return;
            }
        };

        match outcome.kind {
            ActionKind::Create => {
                self.counters.created += 1;
                self.counters.uploaded += 1;
                self.verbose(format_args!("Uploaded {}", name));
            }
            ActionKind::Update => {
                self.counters.uploaded += 1;
                self.verbose(format_args!("Uploaded {}", name));
            }
            ActionKind::Skip => {
                self.counters.skipped += 1;
                if let SyncDecision::Skip { reason, .. } = decision {
                    self.verbose(format_args!("Skipped {}: {}", name, reason));
                }
            }
            ActionKind::Delete => {
                self.counters.deleted += 1;
                self.verbose(format_args!("Deleted {}", name));
            }
        }
    }

    /// 记录单个对象的失败；运行继续
    pub fn record_failure(&mut self, object_name: &str, err: SyncError) {
        warn!("同步失败: {}: {}", object_name, err);
        self.counters.failed += 1;
        self.line(format_args!("Failed {}: {}", object_name, err));
        self.errors.push(err);
    }

    pub fn print_summary(&mut self) {
        let c = self.counters;
        self.line("");
        if self.dry_run {
            self.line("Test run complete with the following results:");
        }
        self.line(format_args!(
            "Skipped {}. Created {}. Updated {}. Deleted {}.",
            c.skipped,
            c.created,
            c.update_count(),
            c.deleted
        ));
        if c.failed > 0 {
            self.line(format_args!("Failed {}.", c.failed));
        }
    }

    /// 容器详情（verbosity > 1）
    pub fn print_details(&mut self, details: &ContainerDetails) {
        let rows = [
            ("CDN public uri:          ", details.public_uri.clone()),
            ("CDN public ssl uri:      ", details.public_ssl_uri.clone()),
            ("CDN public streaming uri:", details.public_streaming_uri.clone()),
            ("CDN TTL:", details.cdn_ttl.map(|ttl| ttl.to_string())),
            ("CDN Size:", details.size_used.map(|size| size.to_string())),
        ];
        for (label, value) in rows {
            if let Some(value) = value {
                self.verbose(format_args!("{} {}", label, value));
            }
        }
    }

    pub fn flush(&mut self) {
        let _ = self.out.flush();
    }

    pub fn finish(mut self) -> (RunCounters, Vec<SyncError>) {
        self.flush();
        (self.counters, self.errors)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::planner::SkipReason;
    use crate::error::RemoteOp;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};

    /// 可在测试中读取的输出缓冲
    #[derive(Clone, Default)]
    pub(crate) struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        pub(crate) fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn reporter(verbosity: u8, dry_run: bool) -> (Reporter, SharedBuffer) {
        let buffer = SharedBuffer::default();
        (
            Reporter::with_writer(verbosity, dry_run, Box::new(buffer.clone())),
            buffer,
        )
    }

    fn ok(kind: ActionKind) -> Result<ActionOutcome, SyncError> {
        Ok(ActionOutcome {
            kind,
            dry_run: false,
        })
    }

    fn create(name: &str) -> SyncDecision {
        SyncDecision::Create {
            object_name: name.into(),
            local_path: PathBuf::from(name),
        }
    }

    #[test]
    fn test_counts_and_summary() {
        let (mut r, out) = reporter(1, false);
        r.record(&create("a.css"), ok(ActionKind::Create));
        r.record(
            &SyncDecision::Update {
                object_name: "b.js".into(),
                local_path: PathBuf::from("b.js"),
            },
            ok(ActionKind::Update),
        );
        r.record(
            &SyncDecision::Skip {
                object_name: "c.js".into(),
                reason: SkipReason::NotModifiedChecksum,
            },
            ok(ActionKind::Skip),
        );
        r.record(
            &SyncDecision::Delete {
                object_name: "old.png".into(),
            },
            ok(ActionKind::Delete),
        );
        r.print_summary();

        let counters = r.counters();
        assert_eq!(counters.created, 1);
        assert_eq!(counters.uploaded, 2);
        assert_eq!(counters.update_count(), 1);
        assert_eq!(
            out.contents(),
            "\nSkipped 1. Created 1. Updated 1. Deleted 1.\n"
        );
    }

    #[test]
    fn test_dry_run_header_and_failures() {
        let (mut r, out) = reporter(1, true);
        r.record(
            &create("a.css"),
            Err(SyncError::remote_write("a.css", RemoteOp::Create, "503")),
        );
        r.print_summary();

        let text = out.contents();
        assert!(text.contains("Failed a.css: Remote create failed for a.css: 503\n"));
        assert!(text.contains("Test run complete with the following results:\n"));
        assert!(text.ends_with("Skipped 0. Created 0. Updated 0. Deleted 0.\nFailed 1.\n"));

        let (counters, errors) = r.finish();
        assert_eq!(counters.failed, 1);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_verbose_lines() {
        let (mut r, out) = reporter(2, false);
        r.record(&create("a.css"), ok(ActionKind::Create));
        r.record(
            &SyncDecision::Skip {
                object_name: "b.js".into(),
                reason: SkipReason::NotModifiedTimestamp,
            },
            ok(ActionKind::Skip),
        );
        r.print_details(&ContainerDetails {
            public_uri: Some("http://cdn/x".into()),
            cdn_ttl: Some(900),
            ..Default::default()
        });

        assert_eq!(
            out.contents(),
            "Uploaded a.css\n\
             Skipped b.js: not modified (timestamp)\n\
             CDN public uri:           http://cdn/x\n\
             CDN TTL: 900\n"
        );
    }

    #[test]
    fn test_quiet_verbosity() {
        let (mut r, out) = reporter(0, false);
        r.record(&create("a.css"), ok(ActionKind::Create));
        r.print_summary();
        assert!(out.contents().is_empty());
        assert_eq!(r.counters().created, 1);
    }
}
