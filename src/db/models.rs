//! 持久层数据模型
//!
//! 时间字段统一为 Unix millis (`i64`)，时区转换在调用方完成。

use serde::{Deserialize, Serialize};

/// 秒杀券 — 售卖定义，对秒杀核心只读
///
/// 库存同时存在于持久行和缓存镜像 (`seckill:stock:{id}`)。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeckillVoucher {
    pub voucher_id: i64,
    pub shop_id: i64,
    /// 持久库存 — 只允许条件扣减语句修改
    pub stock: i64,
    /// 开售时间 (Unix millis)
    pub begin_time: i64,
    /// 停售时间 (Unix millis)
    pub end_time: i64,
}

/// 优惠券订单行
///
/// (user_id, voucher_id) 全局唯一，由准入标记与持久层索引双重保证。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherOrder {
    /// 生成器签发的全局唯一 id
    pub id: i64,
    pub user_id: i64,
    pub voucher_id: i64,
    pub created_at: i64,
}

/// 店铺 — 热点读实体，缓存客户端的演示消费方
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shop {
    pub id: i64,
    pub name: String,
    pub type_id: i64,
    pub updated_at: Option<i64>,
}
