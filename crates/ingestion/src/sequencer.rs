//! Per-path ordering for catalog updates running on a concurrent pool.
//!
//! Tickets are issued in event order. A ticket waits until every earlier
//! ticket that touched one of its paths has been released, so a rename's
//! Remove always lands before a later Create on the same path, even when
//! the two run on different workers. Tickets on unrelated paths never wait
//! for each other.

use std::collections::HashMap;
use std::sync::Mutex;

use futures::future::{FutureExt, Shared};
use tokio::sync::oneshot;

/// Resolves once the ticket that owns it is released or dropped.
type Tail = Shared<oneshot::Receiver<()>>;

#[derive(Default)]
pub struct PathSequencer {
    tails: Mutex<Tails>,
}

/// Latest ticket per exact path and per subtree prefix.
#[derive(Default)]
struct Tails {
    paths: HashMap<String, Tail>,
    subtrees: HashMap<String, Tail>,
}

impl Tails {
    fn prune(&mut self) {
        self.paths.retain(|_, tail| !finished(tail));
        self.subtrees.retain(|_, tail| !finished(tail));
    }
}

fn finished(tail: &Tail) -> bool {
    tail.clone().now_or_never().is_some()
}

/// A place in line on one or more paths.
pub struct Ticket {
    waits: Vec<Tail>,
    release: oneshot::Sender<()>,
}

/// Held while the operation runs. Dropping it lets the next ticket through.
pub struct Turn {
    _release: oneshot::Sender<()>,
}

impl PathSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a ticket on every path in `paths`. Duplicates count once.
    pub fn ticket<I, S>(&self, paths: I) -> Ticket
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ticket_scoped(paths, Vec::<String>::new())
    }

    /// Take a ticket on `paths` and on every path starting with one of
    /// `subtrees`.
    ///
    /// A subtree ticket waits for earlier tickets on any path below it, and
    /// later tickets on those paths wait for it.
    pub fn ticket_scoped<I, S, J, T>(&self, paths: I, subtrees: J) -> Ticket
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        J: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let paths = unique(paths);
        let subtrees = unique(subtrees);

        // A poisoned map only loses ordering history, never tickets.
        let mut tails = self.tails.lock().unwrap_or_else(|e| e.into_inner());
        tails.prune();

        let mut waits = Vec::new();
        for path in &paths {
            waits.extend(tails.paths.get(path).cloned());
            waits.extend(
                tails
                    .subtrees
                    .iter()
                    .filter(|(prefix, _)| path.starts_with(prefix.as_str()))
                    .map(|(_, tail)| tail.clone()),
            );
        }
        for prefix in &subtrees {
            waits.extend(
                tails
                    .paths
                    .iter()
                    .filter(|(path, _)| path.starts_with(prefix.as_str()))
                    .map(|(_, tail)| tail.clone()),
            );
            waits.extend(
                tails
                    .subtrees
                    .iter()
                    .filter(|(other, _)| other.starts_with(prefix.as_str()) || prefix.starts_with(other.as_str()))
                    .map(|(_, tail)| tail.clone()),
            );
        }

        let (release, rx) = oneshot::channel();
        let tail = rx.shared();
        for path in paths {
            tails.paths.insert(path, tail.clone());
        }
        for prefix in subtrees {
            tails.subtrees.insert(prefix, tail.clone());
        }

        Ticket { waits, release }
    }

    /// Paths and subtrees with an operation queued or running.
    pub fn tracked(&self) -> usize {
        let mut tails = self.tails.lock().unwrap_or_else(|e| e.into_inner());
        tails.prune();
        tails.paths.len() + tails.subtrees.len()
    }
}

fn unique<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut items: Vec<String> = items.into_iter().map(Into::into).collect();
    items.sort();
    items.dedup();
    items
}

impl Ticket {
    /// Wait for every earlier overlapping ticket to be released.
    pub async fn wait(self) -> Turn {
        for previous in self.waits {
            // Released or dropped, either way the earlier operation is over.
            let _ = previous.await;
        }
        Turn {
            _release: self.release,
        }
    }
}
