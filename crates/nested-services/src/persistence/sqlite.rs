// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed store.
//!
//! Each [`SqliteStore`] owns a single connection; the store pool decides how
//! many of them exist.

use async_trait::async_trait;
use nested_protocol::{Invoice, Product, Token, User};
use sqlx::{Connection, SqliteConnection};
use tracing::debug;

use super::Store;
use crate::error::StoreError;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT,
        surname TEXT,
        email TEXT,
        password TEXT,
        telephone TEXT,
        birthday TEXT,
        country TEXT,
        address TEXT,
        address_information TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS invoices (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER,
        creation_date INTEGER,
        delivery_address TEXT,
        delivery_postcode TEXT,
        delivery_country TEXT,
        delivery_currency TEXT,
        delivery_address_information TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS invoice_products (
        invoice_id INTEGER NOT NULL REFERENCES invoices(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        product_id INTEGER,
        name TEXT,
        price REAL,
        quantity INTEGER,
        PRIMARY KEY (invoice_id, position)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS tokens (
        token TEXT PRIMARY KEY,
        user_id INTEGER,
        valid_from INTEGER,
        user_agent TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_tokens_user_id ON tokens(user_id)",
];

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    name: Option<String>,
    surname: Option<String>,
    email: Option<String>,
    password: Option<String>,
    telephone: Option<String>,
    birthday: Option<String>,
    country: Option<String>,
    address: Option<String>,
    address_information: Option<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: Some(row.id),
            name: row.name,
            surname: row.surname,
            email: row.email,
            password: row.password,
            telephone: row.telephone,
            birthday: row.birthday,
            country: row.country,
            address: row.address,
            address_information: row.address_information,
        }
    }
}

#[derive(sqlx::FromRow)]
struct InvoiceRow {
    id: i64,
    user_id: Option<i64>,
    creation_date: Option<i64>,
    delivery_address: Option<String>,
    delivery_postcode: Option<String>,
    delivery_country: Option<String>,
    delivery_currency: Option<String>,
    delivery_address_information: Option<String>,
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    product_id: Option<i64>,
    name: Option<String>,
    price: Option<f64>,
    quantity: Option<i64>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.product_id,
            name: row.name,
            price: row.price,
            quantity: row.quantity.and_then(|q| u32::try_from(q).ok()),
        }
    }
}

#[derive(sqlx::FromRow)]
struct TokenRow {
    token: String,
    user_id: Option<i64>,
    valid_from: Option<i64>,
    user_agent: Option<String>,
}

impl From<TokenRow> for Token {
    fn from(row: TokenRow) -> Self {
        Token {
            user_id: row.user_id,
            token: Some(row.token),
            valid_from: row.valid_from,
            user_agent: row.user_agent,
        }
    }
}

/// Store backed by one SQLite connection.
pub struct SqliteStore {
    conn: SqliteConnection,
}

impl SqliteStore {
    /// Connect to `url` and create the tables if they are missing.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let mut conn = SqliteConnection::connect(url)
            .await
            .map_err(|e| StoreError::Backend {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {}: {}", url, e),
            })?;

        sqlx::query("PRAGMA foreign_keys = ON")
            .execute(&mut conn)
            .await?;
        for statement in SCHEMA {
            sqlx::query(*statement)
                .execute(&mut conn)
                .await
                .map_err(|e| StoreError::Backend {
                    operation: "schema".to_string(),
                    details: e.to_string(),
                })?;
        }

        debug!(url, "SQLite store ready");
        Ok(Self { conn })
    }

    async fn load_products(&mut self, invoice_id: i64) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query_as::<_, ProductRow>(
            r#"
            SELECT product_id, name, price, quantity
            FROM invoice_products
            WHERE invoice_id = ?
            ORDER BY position
            "#,
        )
        .bind(invoice_id)
        .fetch_all(&mut self.conn)
        .await?;

        Ok(rows.into_iter().map(Product::from).collect())
    }
}

async fn insert_products(
    conn: &mut SqliteConnection,
    invoice_id: i64,
    products: &[Product],
) -> Result<(), StoreError> {
    for (position, product) in products.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO invoice_products (invoice_id, position, product_id, name, price, quantity)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(invoice_id)
        .bind(position as i64)
        .bind(product.id)
        .bind(product.name.as_deref())
        .bind(product.price)
        .bind(product.quantity.map(i64::from))
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_user(&mut self, mut user: User) -> Result<User, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO users (name, surname, email, password, telephone, birthday,
                               country, address, address_information)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.name.as_deref())
        .bind(user.surname.as_deref())
        .bind(user.email.as_deref())
        .bind(user.password.as_deref())
        .bind(user.telephone.as_deref())
        .bind(user.birthday.as_deref())
        .bind(user.country.as_deref())
        .bind(user.address.as_deref())
        .bind(user.address_information.as_deref())
        .execute(&mut self.conn)
        .await?;

        user.id = Some(result.last_insert_rowid());
        Ok(user)
    }

    async fn read_user(&mut self, id: i64) -> Result<User, StoreError> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, name, surname, email, password, telephone, birthday,
                   country, address, address_information
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut self.conn)
        .await?
        .map(User::from)
        .ok_or_else(|| StoreError::not_found("user", id))
    }

    async fn update_user(&mut self, user: User) -> Result<User, StoreError> {
        let id = user.id.ok_or_else(|| StoreError::not_found("user", "<none>"))?;
        let result = sqlx::query(
            r#"
            UPDATE users
            SET name = ?, surname = ?, email = ?, password = ?, telephone = ?,
                birthday = ?, country = ?, address = ?, address_information = ?
            WHERE id = ?
            "#,
        )
        .bind(user.name.as_deref())
        .bind(user.surname.as_deref())
        .bind(user.email.as_deref())
        .bind(user.password.as_deref())
        .bind(user.telephone.as_deref())
        .bind(user.birthday.as_deref())
        .bind(user.country.as_deref())
        .bind(user.address.as_deref())
        .bind(user.address_information.as_deref())
        .bind(id)
        .execute(&mut self.conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("user", id));
        }
        Ok(user)
    }

    async fn delete_user(&mut self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("user", id));
        }
        Ok(())
    }

    async fn create_invoice(&mut self, mut invoice: Invoice) -> Result<Invoice, StoreError> {
        let mut tx = self.conn.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO invoices (user_id, creation_date, delivery_address, delivery_postcode,
                                  delivery_country, delivery_currency, delivery_address_information)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(invoice.user_id)
        .bind(invoice.creation_date)
        .bind(invoice.delivery_address.as_deref())
        .bind(invoice.delivery_postcode.as_deref())
        .bind(invoice.delivery_country.as_deref())
        .bind(invoice.delivery_currency.as_deref())
        .bind(invoice.delivery_address_information.as_deref())
        .execute(&mut *tx)
        .await?;

        let id = result.last_insert_rowid();
        insert_products(&mut *tx, id, &invoice.products).await?;
        tx.commit().await?;

        invoice.id = Some(id);
        Ok(invoice)
    }

    async fn read_invoice(&mut self, id: i64) -> Result<Invoice, StoreError> {
        let row = sqlx::query_as::<_, InvoiceRow>(
            r#"
            SELECT id, user_id, creation_date, delivery_address, delivery_postcode,
                   delivery_country, delivery_currency, delivery_address_information
            FROM invoices
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&mut self.conn)
        .await?
        .ok_or_else(|| StoreError::not_found("invoice", id))?;

        let products = self.load_products(row.id).await?;
        Ok(Invoice {
            id: Some(row.id),
            user_id: row.user_id,
            creation_date: row.creation_date,
            delivery_address: row.delivery_address,
            delivery_postcode: row.delivery_postcode,
            delivery_country: row.delivery_country,
            delivery_currency: row.delivery_currency,
            delivery_address_information: row.delivery_address_information,
            products,
        })
    }

    async fn update_invoice(&mut self, invoice: Invoice) -> Result<Invoice, StoreError> {
        let id = invoice
            .id
            .ok_or_else(|| StoreError::not_found("invoice", "<none>"))?;
        let mut tx = self.conn.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE invoices
            SET user_id = ?, creation_date = ?, delivery_address = ?, delivery_postcode = ?,
                delivery_country = ?, delivery_currency = ?, delivery_address_information = ?
            WHERE id = ?
            "#,
        )
        .bind(invoice.user_id)
        .bind(invoice.creation_date)
        .bind(invoice.delivery_address.as_deref())
        .bind(invoice.delivery_postcode.as_deref())
        .bind(invoice.delivery_country.as_deref())
        .bind(invoice.delivery_currency.as_deref())
        .bind(invoice.delivery_address_information.as_deref())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("invoice", id));
        }

        sqlx::query("DELETE FROM invoice_products WHERE invoice_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        insert_products(&mut *tx, id, &invoice.products).await?;
        tx.commit().await?;

        Ok(invoice)
    }

    async fn delete_invoice(&mut self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM invoices WHERE id = ?")
            .bind(id)
            .execute(&mut self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("invoice", id));
        }
        Ok(())
    }

    async fn create_token(&mut self, token: Token) -> Result<Token, StoreError> {
        let value = token.token.as_deref().ok_or_else(|| StoreError::Backend {
            operation: "create_token".to_string(),
            details: "token value is required".to_string(),
        })?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO tokens (token, user_id, valid_from, user_agent)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(value)
        .bind(token.user_id)
        .bind(token.valid_from)
        .bind(token.user_agent.as_deref())
        .execute(&mut self.conn)
        .await?;

        Ok(token)
    }

    async fn read_token(&mut self, token: &str) -> Result<Token, StoreError> {
        sqlx::query_as::<_, TokenRow>(
            "SELECT token, user_id, valid_from, user_agent FROM tokens WHERE token = ?",
        )
        .bind(token)
        .fetch_optional(&mut self.conn)
        .await?
        .map(Token::from)
        .ok_or_else(|| StoreError::not_found("token", token))
    }

    async fn delete_token(&mut self, token: &str) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM tokens WHERE token = ?")
            .bind(token)
            .execute(&mut self.conn)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("token", token));
        }
        Ok(())
    }

    async fn delete_user_tokens(&mut self, user_id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM tokens WHERE user_id = ?")
            .bind(user_id)
            .execute(&mut self.conn)
            .await?;
        Ok(result.rows_affected())
    }
}
