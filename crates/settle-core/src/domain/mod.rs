//! 정산 엔진 도메인 모델.
//!
//! 이 모듈은 다음을 포함합니다:
//! - 잔고 및 하위 계정 타입
//! - 통화 매핑
//! - 주문/출금 규칙
//! - 주문 및 출금 상태 머신 레코드
//! - 거래소 식별 정보

mod balance;
mod currency;
mod exchange;
mod order;
mod rules;
mod withdrawal;

pub use balance::*;
pub use currency::*;
pub use exchange::*;
pub use order::*;
pub use rules::*;
pub use withdrawal::*;
