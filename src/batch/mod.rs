//! 请求批处理模块：按固定并发窗口批量执行带重试的操作。
//!
//! # Request Batching Module
//!
//! Runs a list of independent operations, each with retry, at most
//! `concurrency` at a time.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`BatchExecutor`] | Executes operations in fixed-size windows |
//! | [`BatchResult`] | Per-operation outcomes in input order plus timing |
//! | [`BatchOutcome`] | Index and result of one operation |
//!
//! ## Example
//!
//! ```rust
//! use resilient_fetch::batch::BatchExecutor;
//! use resilient_fetch::resilience::RetryExecutor;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let executor = BatchExecutor::new(RetryExecutor::default(), 2);
//! let ops: Vec<_> = (0..4u32).map(|i| move || async move { Ok(i * 10) }).collect();
//! let result = executor.run(ops).await;
//! assert!(result.all_succeeded());
//! # }
//! ```
//!
//! A window of `concurrency` operations must settle completely before the
//! next window starts, so one slow operation holds up its whole window.

mod executor;

pub use executor::{BatchExecutor, BatchOutcome, BatchResult};
