use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// 订单方向，区分买单和卖单
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

/// 一笔限价订单的值语义表示
///
/// `order_id` 由调用方分配，必须全局唯一；`timestamp_ns` 是进入订单簿时的
/// 纳秒时间戳，只用于记录到达时间；同价位的先后顺序由队列位置保证，
/// 订单簿内部不会比较时间戳。
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Order {
    pub order_id: u64,
    pub side: Side,
    // 限价，按精确值比较（无容差）
    pub price: f64,
    // 剩余数量，只有改单会修改它
    pub quantity: u64,
    pub timestamp_ns: u64,
}

/// 快照中的一个价格档位：价格 + 该价位的总挂单量
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelView {
    pub price: f64,
    pub total_quantity: u64,
}

/// 单侧深度序列
///
/// 常用的快照深度（5档/10档）不会超过内联容量，避免堆分配
pub type DepthLevels = SmallVec<[LevelView; 16]>;

/// 订单簿某一时刻的盘口快照
///
/// 两侧都按最优价在前排列：买侧价格从高到低，卖侧价格从低到高
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub bids: DepthLevels,
    pub asks: DepthLevels,
}
