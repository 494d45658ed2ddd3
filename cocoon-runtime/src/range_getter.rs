// Copyright (c) 2023 The Cocoon Authors

use crate::connector::ConnectorClient;
use crate::error::RuntimeError;
use cocoon_models::ledger::Transaction;
use cocoon_store_exports::RangeQuery;
use std::collections::VecDeque;

/// Transactions fetched per call
pub const RANGE_PAGE_SIZE: usize = 50;

/// Pages through the keys of a ledger
pub struct RangeGetter {
    connector: Box<dyn ConnectorClient>,
    link_to: String,
    ledger: String,
    start: String,
    end: String,
    inclusive: bool,
    offset: usize,
    txs: VecDeque<Transaction>,
    exhausted: bool,
}

impl RangeGetter {
    pub(crate) fn new(
        connector: Box<dyn ConnectorClient>,
        link_to: &str,
        ledger: &str,
        start: &str,
        end: &str,
        inclusive: bool,
    ) -> Self {
        RangeGetter {
            connector,
            link_to: link_to.to_string(),
            ledger: ledger.to_string(),
            start: start.to_string(),
            end: end.to_string(),
            inclusive,
            offset: 0,
            txs: VecDeque::new(),
            exhausted: false,
        }
    }

    async fn fetch(&mut self) -> Result<(), RuntimeError> {
        let query = RangeQuery {
            start: self.start.clone(),
            end: self.end.clone(),
            inclusive: self.inclusive,
            limit: RANGE_PAGE_SIZE,
            offset: self.offset,
        };
        let page = self
            .connector
            .get_range(&self.link_to, &self.ledger, query)
            .await?;
        self.exhausted = page.len() < RANGE_PAGE_SIZE;
        self.offset += page.len();
        self.txs.extend(page);
        Ok(())
    }

    /// Next transaction of the range, `None` once it is exhausted
    pub async fn next(&mut self) -> Result<Option<Transaction>, RuntimeError> {
        if self.txs.is_empty() && !self.exhausted {
            self.fetch().await?;
        }
        Ok(self.txs.pop_front())
    }

    /// Restarts from the beginning of the range
    pub fn reset(&mut self) {
        self.offset = 0;
        self.txs.clear();
        self.exhausted = false;
    }
}
