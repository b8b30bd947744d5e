/// 纳秒时间戳工具
///
/// 订单携带的进入时间戳只用于记录到达时间，同价位的先后顺序由
/// 队列位置保证，订单簿内部不比较时间戳。上层在构造订单时从这里取值。
///
/// 订单簿这一层是单线程同步设计，批量时钟因此用普通结构体实现，
/// 不需要原子操作或线程本地存储。
use std::time::{SystemTime, UNIX_EPOCH};

/// 获取当前纳秒时间戳（每次调用都触发系统调用）
#[inline]
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

/// 批量时钟
///
/// 每 `refresh_interval` 次调用才真正读取系统时间，其余调用返回缓存值。
/// 适合高频下单场景：时间戳允许轻微滞后，换取省掉绝大部分系统调用。
/// 需要精确时间时直接用 `now_ns()`。
#[derive(Debug, Clone)]
pub struct BatchClock {
    cached_ns: u64,
    calls_since_refresh: u32,
    refresh_interval: u32,
}

impl BatchClock {
    /// 默认刷新间隔（每多少次调用更新一次缓存）
    pub const DEFAULT_REFRESH_INTERVAL: u32 = 100;

    /// 创建默认刷新间隔的时钟
    pub fn new() -> Self {
        Self::with_interval(Self::DEFAULT_REFRESH_INTERVAL)
    }

    /// 创建指定刷新间隔的时钟
    pub fn with_interval(refresh_interval: u32) -> Self {
        assert!(refresh_interval > 0, "Refresh interval must be positive");

        Self {
            cached_ns: now_ns(),
            calls_since_refresh: 0,
            refresh_interval,
        }
    }

    /// 获取纳秒时间戳，可能返回缓存值
    #[inline]
    pub fn now_ns(&mut self) -> u64 {
        if self.calls_since_refresh >= self.refresh_interval {
            self.cached_ns = now_ns();
            self.calls_since_refresh = 0;
        } else {
            self.calls_since_refresh += 1;
        }
        self.cached_ns
    }

    /// 强制刷新缓存并返回新值
    pub fn refresh(&mut self) -> u64 {
        self.cached_ns = now_ns();
        self.calls_since_refresh = 0;
        self.cached_ns
    }
}

impl Default for BatchClock {
    fn default() -> Self {
        Self::new()
    }
}
