//! # Settle Engine
//!
//! 정산 자동화 엔진입니다.
//!
//! - `ExchangeManager`: (거래소, 사용자) → 거래소 클라이언트
//! - `RuleCache`: TTL 기반 주문/출금 규칙 캐시
//! - `OrderEngine`: 페어별 전체 잔고 시장가 주문과 상태 추적
//! - `WithdrawalEngine`: 설정별 자동 출금과 상태 추적
//! - `EngineRuntime`: 주기 루프 실행과 종료
//!
//! 저장소는 `Repository` 포트로 주입되며 `MemoryRepository`를 기본 제공합니다.

pub mod error;
pub mod manager;
pub mod order_engine;
pub mod repository;
pub mod rule_cache;
pub mod runtime;
pub mod stats;
pub mod withdrawal_engine;

pub use error::{EngineError, EngineResult, RepositoryError, RepositoryResult};
pub use manager::{ExchangeManager, ExchangeRegistry};
pub use order_engine::OrderEngine;
pub use repository::{
    resume_transfers, suspend_transfers, ExchangeConnection, MemoryRepository, Repository,
    RuleEntry, RuleKey, RuleKind, Transaction,
};
pub use rule_cache::RuleCache;
pub use runtime::{EngineRuntime, Engines};
pub use stats::{CycleStats, Outcome};
pub use withdrawal_engine::WithdrawalEngine;
