//! 거래소 커넥터.
//!
//! 커넥터마다 서명 방식, 요청 한도 표, 에러 코드 표가 다릅니다.
//!
//! | 거래소 | 서명 | 거래 계정 | 출금 계정 |
//! |---|---|---|---|
//! | binance | A | spot | spot |
//! | bybit | B | unified | funding |
//! | gateio | C | spot | spot |
//! | kucoin | D | trade | main |

pub mod binance;
pub mod bybit;
pub mod gateio;
pub mod kucoin;

use settle_core::ExchangeIdentity;
use std::sync::Arc;
use std::time::Duration;

use crate::adapter::{AdapterConfig, ErrorDecoder, ProtocolAdapter};
use crate::error::ExchangeResult;
use crate::factory::ClientContext;
use crate::rate_limit::QuotaTable;
use crate::signer::Signer;

/// 컨텍스트 설정으로 어댑터를 구성합니다.
pub(crate) fn build_adapter(
    identity: &ExchangeIdentity,
    ctx: &ClientContext,
    quotas: QuotaTable,
    decoder: Arc<dyn ErrorDecoder>,
    signer: Option<Arc<dyn Signer>>,
) -> ExchangeResult<ProtocolAdapter> {
    let config = AdapterConfig::new(ctx.base_url(identity))
        .with_timeout(Duration::from_secs(ctx.exchange.timeout_secs.max(1)));

    let adapter = ProtocolAdapter::new(identity.slug.clone(), config, quotas, decoder)?
        .with_limiter(ctx.limiter.clone())
        .with_cancel(ctx.cancel.clone());

    Ok(match (signer, &ctx.connection_hash) {
        (Some(signer), Some(hash)) => adapter.with_signer(signer, hash.as_str()),
        (Some(signer), None) => adapter.with_signer(signer, identity.slug.clone()),
        (None, _) => adapter,
    })
}
