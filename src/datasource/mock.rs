//! Mock info source for testing without network calls.

use super::{DataSourceError, InfoSource};
use crate::domain::{AccountState, BookSnapshot, Coin};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

/// Returns predefined books and account state.
#[derive(Debug, Default)]
pub struct MockInfoSource {
    books: Mutex<HashMap<Coin, BookSnapshot>>,
    account: Mutex<Option<AccountState>>,
}

impl MockInfoSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_book(self, book: BookSnapshot) -> Self {
        self.set_book(book);
        self
    }

    pub fn with_account(self, account: AccountState) -> Self {
        *self.account.lock() = Some(account);
        self
    }

    /// Replace the book served for its instrument.
    pub fn set_book(&self, book: BookSnapshot) {
        self.books.lock().insert(book.coin().clone(), book);
    }

    /// Make subsequent account fetches fail.
    pub fn clear_account(&self) {
        *self.account.lock() = None;
    }
}

#[async_trait]
impl InfoSource for MockInfoSource {
    async fn fetch_l2_book(&self, coin: &Coin) -> Result<BookSnapshot, DataSourceError> {
        self.books
            .lock()
            .get(coin)
            .cloned()
            .ok_or_else(|| DataSourceError::Other(format!("no book for {}", coin)))
    }

    async fn fetch_account_state(&self, _user: &str) -> Result<AccountState, DataSourceError> {
        self.account
            .lock()
            .clone()
            .ok_or_else(|| DataSourceError::NetworkError("account unavailable".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PriceLevel, TimeMs};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_mock_serves_books_by_coin() {
        let book = BookSnapshot::new(
            Coin::new("BTC"),
            vec![PriceLevel::new(dec!(100), dec!(1), 1)],
            vec![PriceLevel::new(dec!(101), dec!(1), 1)],
            TimeMs::new(1),
        )
        .unwrap();
        let mock = MockInfoSource::new().with_book(book.clone());

        assert_eq!(mock.fetch_l2_book(&Coin::new("BTC")).await.unwrap(), book);
        assert!(mock.fetch_l2_book(&Coin::new("ETH")).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_account_can_fail() {
        let mock = MockInfoSource::new().with_account(AccountState::default());
        assert!(mock.fetch_account_state("0x1").await.is_ok());
        mock.clear_account();
        assert!(mock.fetch_account_state("0x1").await.is_err());
    }
}
