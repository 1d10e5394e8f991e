// ==========================================
// 学费缴款对账系统 - 请求上下文
// ==========================================
// 职责: 携带一次导入请求的关联 ID / 操作员 / 时钟
// 约束: 显式传参，不使用进程级静态状态
// ==========================================

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct RequestContext {
    /// 关联 ID（贯穿日志与批次审计）
    pub correlation_id: String,
    /// 发起导入的操作员
    pub operator: String,
    /// 请求开始时刻（本地时区）
    pub started_at: DateTime<Local>,
}

impl RequestContext {
    pub fn new(operator: impl Into<String>) -> Self {
        Self {
            correlation_id: Uuid::new_v4().to_string(),
            operator: operator.into(),
            started_at: Local::now(),
        }
    }

    /// 沿用上游传入的关联 ID（例如作业队列转发的请求）
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// 固定时钟（测试与重放使用）
    pub fn with_clock(mut self, started_at: DateTime<Local>) -> Self {
        self.started_at = started_at;
        self
    }

    /// 导入时刻（本地墙钟时间，用于缺省交易时间与合理区间判断）
    pub fn import_time(&self) -> NaiveDateTime {
        self.started_at.naive_local()
    }

    pub fn started_at_utc(&self) -> DateTime<Utc> {
        self.started_at.with_timezone(&Utc)
    }
}
