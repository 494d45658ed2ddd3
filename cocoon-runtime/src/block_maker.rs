// Copyright (c) 2023 The Cocoon Authors

use crate::connector::ConnectorClient;
use crate::error::RuntimeError;
use cocoon_logging::cocoon_trace;
use cocoon_models::block::Block;
use cocoon_models::ledger::{PutResult, Transaction};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// What the put of an entry resolved to: the block holding it, or an error
pub type EntryResult = Result<Option<Block>, RuntimeError>;

/// A transaction waiting for a block
#[derive(Debug)]
pub struct Entry {
    /// transaction to store; `tx.ledger` is the target ledger
    pub tx: Transaction,
    /// cocoon owning the ledger
    pub link_to: String,
    /// receives the outcome once the group of the entry is committed
    pub resp: oneshot::Sender<EntryResult>,
}

impl Entry {
    /// Entry for `tx`, with the receiver of its outcome
    pub fn new(tx: Transaction, link_to: &str) -> (Self, oneshot::Receiver<EntryResult>) {
        let (resp, rx) = oneshot::channel();
        (
            Entry {
                tx,
                link_to: link_to.to_string(),
                resp,
            },
            rx,
        )
    }
}

/// Stores one group of transactions sharing a cocoon and a ledger
#[async_trait::async_trait]
pub trait Committer: Send + Sync {
    /// Puts `txs` into `ledger` of `link_to`
    async fn commit(
        &self,
        link_to: &str,
        ledger: &str,
        txs: Vec<Transaction>,
    ) -> Result<PutResult, RuntimeError>;
}

/// Commits groups with a put through the connector
pub struct ConnectorCommitter(pub Box<dyn ConnectorClient>);

#[async_trait::async_trait]
impl Committer for ConnectorCommitter {
    async fn commit(
        &self,
        link_to: &str,
        ledger: &str,
        txs: Vec<Transaction>,
    ) -> Result<PutResult, RuntimeError> {
        if txs.is_empty() {
            return Err(RuntimeError::TxRejected("empty entry list".into()));
        }
        Ok(self.0.put(link_to, ledger, txs).await?)
    }
}

/// Queue of puts to chained ledgers, flushed in groups on every tick
#[derive(Clone)]
pub struct BlockMaker {
    queue: Arc<Mutex<VecDeque<Entry>>>,
    max_size: usize,
    interval: Duration,
}

impl BlockMaker {
    /// Block maker taking at most `max_size` entries every `interval`
    pub fn new(max_size: usize, interval: Duration) -> Self {
        BlockMaker {
            queue: Default::default(),
            max_size: max_size.max(1),
            interval,
        }
    }

    /// Queues an entry
    pub fn add(&self, entry: Entry) {
        self.queue.lock().push_back(entry);
    }

    /// Number of queued entries
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// true when nothing is queued
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Maximum number of entries taken per tick
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    fn take_entries(&self) -> Vec<Entry> {
        let mut queue = self.queue.lock();
        let n = queue.len().min(self.max_size);
        queue.drain(..n).collect()
    }

    /// Splits entries into groups sharing `link_to` and ledger.
    /// Entries keep their queue order inside a group.
    pub fn group(mut entries: Vec<Entry>) -> Vec<Vec<Entry>> {
        entries.sort_by(|a, b| (&a.link_to, &a.tx.ledger).cmp(&(&b.link_to, &b.tx.ledger)));
        let mut groups: Vec<Vec<Entry>> = Vec::new();
        for entry in entries {
            match groups.last_mut() {
                Some(group)
                    if group[0].link_to == entry.link_to && group[0].tx.ledger == entry.tx.ledger =>
                {
                    group.push(entry)
                }
                _ => groups.push(vec![entry]),
            }
        }
        groups
    }

    /// Sends the outcome of a commit to every entry of its group
    fn fan_out(entries: Vec<Entry>, result: Result<PutResult, RuntimeError>) {
        for entry in entries {
            let outcome = match &result {
                Ok(put) => match put.receipt(&entry.tx.id) {
                    Some(receipt) if !receipt.err.is_empty() => {
                        Err(RuntimeError::TxRejected(receipt.err.clone()))
                    }
                    _ => Ok(put.block.clone()),
                },
                Err(e) => Err(e.clone()),
            };
            // the caller may have stopped waiting
            let _ = entry.resp.send(outcome);
        }
    }

    /// Takes a batch and commits each of its groups in its own task
    fn tick(&self, committer: &Arc<dyn Committer>) {
        let entries = self.take_entries();
        if entries.is_empty() {
            return;
        }
        let groups = Self::group(entries);
        debug!("blockmaker: committing {} group(s)", groups.len());
        for group in groups {
            let committer = committer.clone();
            tokio::spawn(async move {
                let link_to = group[0].link_to.clone();
                let ledger = group[0].tx.ledger.clone();
                let txs: Vec<Transaction> = group.iter().map(|e| e.tx.clone()).collect();
                cocoon_trace!("blockmaker.commit", { "link_to": link_to, "ledger": ledger, "txs": txs.len() });
                let result = committer.commit(&link_to, &ledger, txs).await;
                Self::fan_out(group, result);
            });
        }
    }

    /// Starts the ticker
    pub fn start(&self, committer: Arc<dyn Committer>) -> BlockMakerHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let maker = self.clone();
        let join = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + maker.interval, maker.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => maker.tick(&committer),
                    _ = &mut stop_rx => break,
                }
            }
            // pending entries are not flushed, their callers get an error
            let dropped = maker.queue.lock().drain(..).count();
            info!("blockmaker stopped, {} pending entries dropped", dropped);
        });
        BlockMakerHandle {
            stop_tx: Some(stop_tx),
            join: Some(join),
        }
    }
}

/// Stops a started block maker
pub struct BlockMakerHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    join: Option<JoinHandle<()>>,
}

impl BlockMakerHandle {
    /// Stops the ticker and waits for it
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }
}

impl Drop for BlockMakerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use cocoon_models::ledger::TxReceipt;

    #[derive(Default)]
    struct RecordingCommitter {
        calls: Mutex<Vec<(String, String, Vec<String>)>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Committer for RecordingCommitter {
        async fn commit(
            &self,
            link_to: &str,
            ledger: &str,
            txs: Vec<Transaction>,
        ) -> Result<PutResult, RuntimeError> {
            self.calls.lock().push((
                link_to.to_string(),
                ledger.to_string(),
                txs.iter().map(|t| t.key.clone()).collect(),
            ));
            if self.fail {
                return Err(RuntimeError::TxRejected("orderer unavailable".into()));
            }
            let block = Block {
                id: format!("block-{}-{}", link_to, ledger),
                ..Default::default()
            };
            Ok(PutResult {
                tx_receipts: txs
                    .iter()
                    .map(|t| TxReceipt {
                        id: t.id.clone(),
                        err: if t.key == "dup" {
                            "transaction with matching id already exists".into()
                        } else {
                            String::new()
                        },
                    })
                    .collect(),
                block: Some(block),
            })
        }
    }

    fn tx(ledger: &str, key: &str) -> Transaction {
        Transaction::new(ledger, key, "v", 0)
    }

    #[test]
    fn groups_by_link_and_ledger_keeping_order() {
        let mut rxs = Vec::new();
        let mut entries = Vec::new();
        for (link, ledger, key) in [
            ("c2", "b", "1"),
            ("c1", "a", "2"),
            ("c2", "b", "3"),
            ("c1", "b", "4"),
            ("c1", "a", "5"),
        ] {
            let (entry, rx) = Entry::new(tx(ledger, key), link);
            entries.push(entry);
            rxs.push(rx);
        }
        let groups: Vec<Vec<String>> = BlockMaker::group(entries)
            .into_iter()
            .map(|g| g.into_iter().map(|e| e.tx.key).collect())
            .collect();
        assert_eq!(groups, vec![vec!["2", "5"], vec!["4"], vec!["1", "3"]]);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_commits_groups_and_fans_out() {
        let committer = Arc::new(RecordingCommitter::default());
        let maker = BlockMaker::new(100, Duration::from_secs(5));
        let handle = maker.start(committer.clone());

        let (e1, rx1) = Entry::new(tx("lg", "k1"), "c1");
        let (e2, rx2) = Entry::new(tx("lg", "dup"), "c1");
        let (e3, rx3) = Entry::new(tx("other", "k3"), "c1");
        maker.add(e1);
        maker.add(e2);
        maker.add(e3);

        let block = rx1.await.unwrap().unwrap().unwrap();
        assert_eq!(block.id, "block-c1-lg");
        assert_matches!(rx2.await.unwrap(), Err(RuntimeError::TxRejected(_)));
        assert_eq!(rx3.await.unwrap().unwrap().unwrap().id, "block-c1-other");
        assert_eq!(committer.calls.lock().len(), 2);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn batches_are_capped() {
        let committer = Arc::new(RecordingCommitter::default());
        let maker = BlockMaker::new(2, Duration::from_secs(5));
        let handle = maker.start(committer.clone());
        let mut rxs = Vec::new();
        for i in 0..3 {
            let (e, rx) = Entry::new(tx("lg", &i.to_string()), "c1");
            maker.add(e);
            rxs.push(rx);
        }
        tokio::time::sleep(Duration::from_millis(5100)).await;
        tokio::task::yield_now().await;
        assert_eq!(maker.len(), 1);
        for rx in rxs {
            rx.await.unwrap().unwrap();
        }
        let calls = committer.calls.lock().clone();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].2, vec!["0", "1"]);
        assert_eq!(calls[1].2, vec!["2"]);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn committer_error_reaches_every_entry() {
        let committer = Arc::new(RecordingCommitter {
            fail: true,
            ..Default::default()
        });
        let maker = BlockMaker::new(100, Duration::from_secs(5));
        let handle = maker.start(committer);
        let (e1, rx1) = Entry::new(tx("lg", "a"), "c1");
        let (e2, rx2) = Entry::new(tx("lg", "b"), "c1");
        maker.add(e1);
        maker.add(e2);
        for rx in [rx1, rx2] {
            assert_eq!(
                rx.await.unwrap(),
                Err(RuntimeError::TxRejected("orderer unavailable".into()))
            );
        }
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_drops_pending_entries() {
        let maker = BlockMaker::new(100, Duration::from_secs(5));
        let handle = maker.start(Arc::new(RecordingCommitter::default()));
        let (e, rx) = Entry::new(tx("lg", "a"), "c1");
        maker.add(e);
        handle.stop().await;
        assert!(rx.await.is_err());
        assert!(maker.is_empty());
    }
}
