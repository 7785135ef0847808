//! 엔진 주기 통계.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::EngineError;

/// 한 단위 작업(페어, 출금 설정, 레코드)의 처리 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 거래소 제출 또는 상태 전이 성공
    Success,
    /// 이번 주기만 건너뜀 (레코드 변경 없음)
    Skipped,
    /// 레코드 실패 처리 또는 처리 중 에러
    Failed,
}

impl From<&EngineError> for Outcome {
    /// 처리 도중 중단된 작업의 결과. 주기 한정 에러는 건너뜀으로 셉니다.
    fn from(err: &EngineError) -> Self {
        if err.is_cycle_local() {
            Outcome::Skipped
        } else {
            Outcome::Failed
        }
    }
}

/// 한 주기의 처리 통계
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CycleStats {
    /// 총 처리 대상 수
    pub total: usize,
    /// 성공 횟수
    pub success: usize,
    /// 건너뛴 횟수
    pub skipped: usize,
    /// 실패 횟수
    pub failed: usize,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl CycleStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: Outcome) {
        self.total += 1;
        match outcome {
            Outcome::Success => self.success += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed => self.failed += 1,
        }
    }

    /// 사용자별 통계를 합칩니다. 소요 시간은 합산하지 않습니다.
    pub fn merge(&mut self, other: &CycleStats) {
        self.total += other.total;
        self.success += other.success;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    /// 성공률 계산 (%)
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.success as f64 / self.total as f64) * 100.0
        }
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, operation: &str) {
        if self.total == 0 {
            tracing::debug!(operation = operation, "처리 대상 없음");
            return;
        }
        tracing::info!(
            operation = operation,
            total = self.total,
            success = self.success,
            skipped = self.skipped,
            failed = self.failed,
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "주기 완료"
        );
    }
}
