//! Concurrent directory traversal.
//!
//! A [`Walker`] turns a set of roots into a stream of [`SizeEvent`]s, one per
//! regular file. Subdirectories are scheduled as [`DirTask`]s, either on a
//! fixed pool of workers sharing one queue ([`Parallelism::Bounded`]) or as
//! one spawned task each ([`Parallelism::Unbounded`]). Files are emitted
//! inline by whichever task lists their parent directory.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use tokio::fs;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use tally_core::{CrawlConfig, CrawlError, CrawlWarning, EntryFilter, Parallelism, SizeEvent};

use crate::inode::InodeTracker;
use crate::source::{self, EntryKind, FileInfo};
use crate::tracker::{TaskGuard, TaskTracker};

/// An in-flight traversal of one directory.
///
/// Holds a registration in the [`TaskTracker`] for as long as it lives.
#[derive(Debug)]
pub struct DirTask {
    /// Directory to list.
    pub path: PathBuf,
    /// Device of the root this directory was reached from.
    pub root_device: u64,
    _registration: TaskGuard,
}

impl DirTask {
    fn new(path: PathBuf, root_device: u64, registration: TaskGuard) -> Self {
        Self {
            path,
            root_device,
            _registration: registration,
        }
    }
}

/// State shared by every traversal task of one crawl.
#[derive(Debug)]
struct WalkContext {
    sink: mpsc::Sender<SizeEvent>,
    tracker: TaskTracker,
    diagnostics: mpsc::UnboundedSender<CrawlWarning>,
    filter: EntryFilter,
    inodes: Option<InodeTracker>,
    cross_filesystems: bool,
}

impl WalkContext {
    /// Send one file size. Returns `false` once the size stream is closed.
    async fn emit(&self, file: FileInfo) -> bool {
        let bytes = match (&self.inodes, file.hardlink) {
            (Some(inodes), Some(key)) if !inodes.track(key) => 0,
            _ => file.size,
        };
        self.sink.send(SizeEvent::new(bytes)).await.is_ok()
    }

    /// Nobody is receiving sizes any more; traversal should wind down.
    fn is_abandoned(&self) -> bool {
        self.sink.is_closed()
    }

    fn warn(&self, warning: CrawlWarning) {
        warn!(path = %warning.path.display(), kind = ?warning.kind, "{}", warning.message);
        let _ = self.diagnostics.send(warning);
    }
}

/// How newly discovered directories get picked up.
#[derive(Clone)]
enum Scheduler {
    Queue(mpsc::UnboundedSender<DirTask>),
    Spawn(tokio_util::task::TaskTracker),
}

impl Scheduler {
    fn schedule(&self, ctx: &Arc<WalkContext>, task: DirTask) {
        if ctx.is_abandoned() {
            return;
        }
        match self {
            Self::Queue(queue) => {
                // Workers hold the receiver until the tracker is idle, which
                // cannot happen while this task is still registered.
                if queue.send(task).is_err() {
                    debug!("directory queue closed");
                }
            }
            Self::Spawn(tasks) => {
                tasks.spawn(spawned_walk(Arc::clone(ctx), task, self.clone()));
            }
        }
    }
}

fn spawned_walk(
    ctx: Arc<WalkContext>,
    task: DirTask,
    scheduler: Scheduler,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move { walk_dir(&ctx, task, &scheduler).await })
}

/// Walks roots and feeds file sizes into the size stream.
pub struct Walker {
    ctx: Arc<WalkContext>,
    parallelism: Parallelism,
}

impl Walker {
    /// Create a walker emitting into `sink` and registering into `tracker`.
    ///
    /// Unreadable entries are reported on `diagnostics`.
    pub fn new(
        config: &CrawlConfig,
        sink: mpsc::Sender<SizeEvent>,
        tracker: TaskTracker,
        diagnostics: mpsc::UnboundedSender<CrawlWarning>,
    ) -> Result<Self, CrawlError> {
        let ctx = WalkContext {
            sink,
            tracker,
            diagnostics,
            filter: config.entry_filter()?,
            inodes: config.dedupe_hardlinks.then(InodeTracker::new),
            cross_filesystems: config.cross_filesystems,
        };

        Ok(Self {
            ctx: Arc::new(ctx),
            parallelism: config.parallelism,
        })
    }

    /// Walk every root to completion.
    ///
    /// Returns once no directory task is outstanding and every traversal task
    /// has exited. The walker owns the size stream's senders, so the stream
    /// closes when the walker is dropped.
    ///
    /// If the receiving side of the stream goes away, pending directories are
    /// released unvisited and the walk returns early.
    pub async fn walk(self, roots: Vec<PathBuf>) {
        let mut seeds = Vec::with_capacity(roots.len());
        for root in roots {
            if self.ctx.is_abandoned() {
                break;
            }
            if let Some(task) = self.seed(root).await {
                seeds.push(task);
            }
        }

        match self.parallelism.worker_count() {
            Some(workers) => self.run_pool(seeds, workers).await,
            None => self.run_unbounded(seeds).await,
        }
        debug!(outstanding = self.ctx.tracker.outstanding(), "walk finished");
    }

    async fn seed(&self, root: PathBuf) -> Option<DirTask> {
        match source::inspect_root(&root).await {
            Ok(EntryKind::Directory { device }) => {
                Some(DirTask::new(root, device, self.ctx.tracker.register()))
            }
            Ok(EntryKind::File(file)) => {
                if !self.ctx.emit(file).await {
                    debug!(root = %root.display(), "size stream closed before root was counted");
                }
                None
            }
            Ok(EntryKind::Other) => {
                debug!(root = %root.display(), "root is neither a file nor a directory");
                None
            }
            Err(err) => {
                self.ctx.warn(CrawlWarning::metadata(&root, &err));
                None
            }
        }
    }

    async fn run_pool(&self, seeds: Vec<DirTask>, workers: usize) {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        for task in seeds {
            let _ = queue_tx.send(task);
        }

        let mut pool = JoinSet::new();
        for id in 0..workers.max(1) {
            pool.spawn(worker(
                id,
                Arc::clone(&self.ctx),
                Scheduler::Queue(queue_tx.clone()),
                Arc::clone(&queue_rx),
            ));
        }
        drop(queue_tx);

        while let Some(joined) = pool.join_next().await {
            if let Err(err) = joined {
                warn!(%err, "walker worker failed");
            }
        }
    }

    async fn run_unbounded(&self, seeds: Vec<DirTask>) {
        let tasks = tokio_util::task::TaskTracker::new();
        let scheduler = Scheduler::Spawn(tasks.clone());
        for task in seeds {
            scheduler.schedule(&self.ctx, task);
        }
        drop(scheduler);

        self.ctx.tracker.wait_idle().await;
        tasks.close();
        tasks.wait().await;
    }
}

async fn worker(
    id: usize,
    ctx: Arc<WalkContext>,
    scheduler: Scheduler,
    queue: Arc<Mutex<mpsc::UnboundedReceiver<DirTask>>>,
) {
    let mut walked = 0usize;
    loop {
        let next = tokio::select! {
            task = async { queue.lock().await.recv().await } => task,
            () = ctx.tracker.wait_idle() => None,
            () = ctx.sink.closed() => None,
        };
        let Some(task) = next else { break };

        walk_dir(&ctx, task, &scheduler).await;
        walked += 1;
    }
    // Anything still queued is dropped with the queue once every worker is
    // gone, which releases its registration.
    debug!(worker = id, walked, abandoned = ctx.is_abandoned(), "walker worker exiting");
}

/// List one directory: emit its files, schedule its subdirectories.
///
/// Stops at the first entry after the size stream closes.
async fn walk_dir(ctx: &Arc<WalkContext>, task: DirTask, scheduler: &Scheduler) {
    if ctx.is_abandoned() {
        return;
    }
    let mut entries = match fs::read_dir(&task.path).await {
        Ok(entries) => entries,
        Err(err) => {
            ctx.warn(CrawlWarning::read_dir(&task.path, &err));
            return;
        }
    };

    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(err) => {
                ctx.warn(CrawlWarning::read_dir(&task.path, &err));
                break;
            }
        };

        if ctx.filter.should_skip(&entry.file_name()) {
            continue;
        }

        let path = entry.path();
        match source::inspect(&path).await {
            Ok(EntryKind::File(file)) => {
                if !ctx.emit(file).await {
                    debug!(path = %task.path.display(), "size stream closed, abandoning directory");
                    return;
                }
            }
            Ok(EntryKind::Directory { device }) => {
                if !ctx.cross_filesystems && device != task.root_device {
                    debug!(path = %path.display(), "skipping directory on another device");
                    continue;
                }
                if ctx.is_abandoned() {
                    return;
                }
                let child = DirTask::new(path, task.root_device, ctx.tracker.register());
                scheduler.schedule(ctx, child);
            }
            Ok(EntryKind::Other) => {}
            Err(err) => ctx.warn(CrawlWarning::metadata(&path, &err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tally_core::WarningKind;
    use tempfile::TempDir;

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        fs::create_dir(root.join("dir1")).unwrap();
        fs::create_dir(root.join("dir2")).unwrap();
        fs::create_dir(root.join("dir1/subdir")).unwrap();

        fs::write(root.join("file1.txt"), "hello").unwrap();
        fs::write(root.join("dir1/file2.txt"), "world world world").unwrap();
        fs::write(root.join("dir1/subdir/file3.txt"), "test").unwrap();
        fs::write(root.join("dir2/file4.txt"), "another file here").unwrap();
        fs::write(root.join(".hidden"), "secret").unwrap();

        temp
    }

    struct Collected {
        sizes: Vec<u64>,
        warnings: Vec<CrawlWarning>,
        outstanding: usize,
    }

    async fn collect(config: &CrawlConfig, roots: Vec<PathBuf>) -> Collected {
        let (tx, mut rx) = mpsc::channel(4);
        let (warn_tx, mut warn_rx) = mpsc::unbounded_channel();
        let tracker = TaskTracker::new();
        let walker = Walker::new(config, tx, tracker.clone(), warn_tx).unwrap();

        let walk = tokio::spawn(walker.walk(roots));
        let mut sizes = Vec::new();
        while let Some(event) = rx.recv().await {
            sizes.push(event.bytes);
        }
        walk.await.unwrap();

        let mut warnings = Vec::new();
        while let Ok(warning) = warn_rx.try_recv() {
            warnings.push(warning);
        }
        sizes.sort_unstable();
        Collected {
            sizes,
            warnings,
            outstanding: tracker.outstanding(),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_bounded_walk() {
        let temp = create_test_tree();
        let config = CrawlConfig::builder()
            .parallelism(Parallelism::Bounded(3))
            .build()
            .unwrap();

        let collected = collect(&config, vec![temp.path().to_path_buf()]).await;
        assert_eq!(collected.sizes, vec![4, 5, 6, 17, 17]);
        assert!(collected.warnings.is_empty());
        assert_eq!(collected.outstanding, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unbounded_walk() {
        let temp = create_test_tree();
        let config = CrawlConfig::builder()
            .parallelism(Parallelism::Unbounded)
            .build()
            .unwrap();

        let collected = collect(&config, vec![temp.path().to_path_buf()]).await;
        assert_eq!(collected.sizes, vec![4, 5, 6, 17, 17]);
        assert_eq!(collected.outstanding, 0);
    }

    #[tokio::test]
    async fn test_single_worker_pool() {
        let temp = create_test_tree();
        let config = CrawlConfig::builder()
            .parallelism(Parallelism::Bounded(1))
            .build()
            .unwrap();

        let collected = collect(&config, vec![temp.path().to_path_buf()]).await;
        assert_eq!(collected.sizes.len(), 5);
    }

    #[tokio::test]
    async fn test_filters() {
        let temp = create_test_tree();
        let config = CrawlConfig::builder()
            .include_hidden(false)
            .ignore_patterns(vec!["dir2".to_string()])
            .build()
            .unwrap();

        let collected = collect(&config, vec![temp.path().to_path_buf()]).await;
        assert_eq!(collected.sizes, vec![4, 5, 17]);
    }

    #[tokio::test]
    async fn test_file_and_missing_roots() {
        let temp = create_test_tree();
        let config = CrawlConfig::default();

        let roots = vec![
            temp.path().join("file1.txt"),
            temp.path().join("does-not-exist"),
            temp.path().join("dir2"),
        ];
        let collected = collect(&config, roots).await;

        assert_eq!(collected.sizes, vec![5, 17]);
        assert_eq!(collected.warnings.len(), 1);
        assert_eq!(collected.warnings[0].kind, WarningKind::NotFound);
        assert_eq!(collected.outstanding, 0);
    }

    #[tokio::test]
    async fn test_no_roots() {
        let collected = collect(&CrawlConfig::default(), Vec::new()).await;
        assert!(collected.sizes.is_empty());
        assert_eq!(collected.outstanding, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hardlink_dedupe() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a"), [1u8; 100]).unwrap();
        fs::hard_link(temp.path().join("a"), temp.path().join("b")).unwrap();

        let plain = collect(&CrawlConfig::default(), vec![temp.path().to_path_buf()]).await;
        assert_eq!(plain.sizes, vec![100, 100]);

        let config = CrawlConfig::builder().dedupe_hardlinks(true).build().unwrap();
        let deduped = collect(&config, vec![temp.path().to_path_buf()]).await;
        assert_eq!(deduped.sizes, vec![0, 100]);
    }

    fn create_wide_tree(dirs: usize, files: usize) -> TempDir {
        let temp = TempDir::new().unwrap();
        for d in 0..dirs {
            let dir = temp.path().join(format!("d{d}"));
            fs::create_dir(&dir).unwrap();
            for f in 0..files {
                fs::write(dir.join(format!("f{f}")), "x").unwrap();
            }
        }
        temp
    }

    async fn walk_until_receiver_dropped(parallelism: Parallelism) {
        let temp = create_wide_tree(50, 20);
        let config = CrawlConfig::builder()
            .parallelism(parallelism)
            .build()
            .unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        let (warn_tx, _warn_rx) = mpsc::unbounded_channel();
        let tracker = TaskTracker::new();
        let walker = Walker::new(&config, tx, tracker.clone(), warn_tx).unwrap();

        let walk = tokio::spawn(walker.walk(vec![temp.path().to_path_buf()]));
        for _ in 0..3 {
            rx.recv().await.unwrap();
        }
        drop(rx);

        tokio::time::timeout(std::time::Duration::from_secs(10), walk)
            .await
            .expect("walk kept going after the stream closed")
            .unwrap();
        assert_eq!(tracker.outstanding(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_pool_stops_when_stream_closes() {
        walk_until_receiver_dropped(Parallelism::Bounded(2)).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_unbounded_stops_when_stream_closes() {
        walk_until_receiver_dropped(Parallelism::Unbounded).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlinks_not_followed() {
        let temp = create_test_tree();
        std::os::unix::fs::symlink(temp.path().join("dir1"), temp.path().join("loop")).unwrap();

        let collected = collect(&CrawlConfig::default(), vec![temp.path().to_path_buf()]).await;
        assert_eq!(collected.sizes.len(), 5);
    }
}
