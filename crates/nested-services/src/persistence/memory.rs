// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory store. Clones share the same records.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use nested_protocol::{Invoice, Token, User};

use super::Store;
use crate::error::StoreError;

#[derive(Default)]
struct Records {
    users: BTreeMap<i64, User>,
    invoices: BTreeMap<i64, Invoice>,
    tokens: HashMap<String, Token>,
    last_user_id: i64,
    last_invoice_id: i64,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<Records>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, Records> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert `user` under its own id, for seeding fixtures.
    pub fn seed_user(&self, user: User) {
        let mut records = self.records();
        if let Some(id) = user.id {
            records.last_user_id = records.last_user_id.max(id);
            records.users.insert(id, user);
        }
    }

    pub fn user_count(&self) -> usize {
        self.records().users.len()
    }

    pub fn token_count(&self) -> usize {
        self.records().tokens.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&mut self, mut user: User) -> Result<User, StoreError> {
        let mut records = self.records();
        records.last_user_id += 1;
        let id = records.last_user_id;
        user.id = Some(id);
        records.users.insert(id, user.clone());
        Ok(user)
    }

    async fn read_user(&mut self, id: i64) -> Result<User, StoreError> {
        self.records()
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("user", id))
    }

    async fn update_user(&mut self, user: User) -> Result<User, StoreError> {
        let id = user.id.ok_or_else(|| StoreError::not_found("user", "<none>"))?;
        let mut records = self.records();
        let stored = records
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("user", id))?;
        *stored = user.clone();
        Ok(user)
    }

    async fn delete_user(&mut self, id: i64) -> Result<(), StoreError> {
        self.records()
            .users
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("user", id))
    }

    async fn create_invoice(&mut self, mut invoice: Invoice) -> Result<Invoice, StoreError> {
        let mut records = self.records();
        records.last_invoice_id += 1;
        let id = records.last_invoice_id;
        invoice.id = Some(id);
        records.invoices.insert(id, invoice.clone());
        Ok(invoice)
    }

    async fn read_invoice(&mut self, id: i64) -> Result<Invoice, StoreError> {
        self.records()
            .invoices
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("invoice", id))
    }

    async fn update_invoice(&mut self, invoice: Invoice) -> Result<Invoice, StoreError> {
        let id = invoice
            .id
            .ok_or_else(|| StoreError::not_found("invoice", "<none>"))?;
        let mut records = self.records();
        let stored = records
            .invoices
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("invoice", id))?;
        *stored = invoice.clone();
        Ok(invoice)
    }

    async fn delete_invoice(&mut self, id: i64) -> Result<(), StoreError> {
        self.records()
            .invoices
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("invoice", id))
    }

    async fn create_token(&mut self, token: Token) -> Result<Token, StoreError> {
        let key = token.token.clone().ok_or_else(|| StoreError::Backend {
            operation: "create_token".to_string(),
            details: "token value is required".to_string(),
        })?;
        self.records().tokens.insert(key, token.clone());
        Ok(token)
    }

    async fn read_token(&mut self, token: &str) -> Result<Token, StoreError> {
        self.records()
            .tokens
            .get(token)
            .cloned()
            .ok_or_else(|| StoreError::not_found("token", token))
    }

    async fn delete_token(&mut self, token: &str) -> Result<(), StoreError> {
        self.records()
            .tokens
            .remove(token)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("token", token))
    }

    async fn delete_user_tokens(&mut self, user_id: i64) -> Result<u64, StoreError> {
        let mut records = self.records();
        let before = records.tokens.len();
        records.tokens.retain(|_, t| t.user_id != Some(user_id));
        Ok((before - records.tokens.len()) as u64)
    }
}
