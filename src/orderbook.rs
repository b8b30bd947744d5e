use crate::pool::NodePool;
use crate::protocol::{BookSnapshot, LevelView, Order, Side};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

/// 让 f64 价格可以作为 BTreeMap 的键
///
/// 按精确值比较，不引入容差；NaN 之间视为相等
#[derive(Debug, Clone, Copy, PartialEq)]
struct PriceKey(f64);

impl Eq for PriceKey {}

impl PartialOrd for PriceKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriceKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.partial_cmp(&other.0).unwrap_or(Ordering::Equal)
    }
}

// 订单簿中的一个节点，代表一个具体的挂单
//
// next/prev 是节点在所属价格队列中的非占有链接（池内句柄），
// 任一时刻一个节点恰好挂在一个价格层的队列里
#[derive(Clone, Debug)]
pub struct OrderNode {
    pub order_id: u64,
    pub side: Side,
    pub price: f64,
    pub quantity: u64,
    pub timestamp_ns: u64,
    // 指向同一个价格队列中的下一个订单
    next: Option<usize>,
    // 指向同一个价格队列中的上一个订单
    prev: Option<usize>,
}

// 代表一个价格层级的所有订单，以双向链表形式存在
#[derive(Clone, Debug)]
struct PriceLevel {
    // 该价位所有挂单数量之和
    total_quantity: u64,
    // 链表头（最早到达，优先级最高）
    head: Option<usize>,
    // 链表尾（最新到达）
    tail: Option<usize>,
}

/// 订单簿操作的可恢复错误
///
/// 「订单不存在」与「内部索引失配」是不同的错误种类；
/// 只关心成败的调用方用 `is_ok()` 即可
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OrderBookError {
    /// 新增订单的 id 已在簿内
    #[error("duplicate order id: {0}")]
    DuplicateOrderId(u64),

    /// 指定 id 的订单不在簿内
    #[error("order not found: {0}")]
    OrderNotFound(u64),

    /// 订单在簿内但其价格层在索引中缺失（先前的不变量已被破坏）
    #[error("no price level for resident order {0}")]
    LevelInconsistency(u64),
}

/// 单一合约的订单簿
///
/// 持有全部未成交挂单，同时按两个维度索引：
/// - 价格/时间优先：两侧各一个按价格排序的层级表，层内 FIFO 队列
/// - 订单号：id → 池句柄映射，撤单/改单无需按价格查找
///
/// 单线程同步设计，内部无锁无原子操作；多线程共享须由调用方互斥
#[derive(Clone)]
pub struct OrderBook {
    // 买单侧；最优价 = 最高价，读取时反向遍历
    bids: BTreeMap<PriceKey, PriceLevel>,
    // 卖单侧；最优价 = 最低价
    asks: BTreeMap<PriceKey, PriceLevel>,
    // 从 order_id 到池句柄的映射，用于 O(1) 定位
    order_lookup: HashMap<u64, usize>,
    // 订单节点池，所有节点存储都在这里
    pool: NodePool<OrderNode>,
}

impl OrderBook {
    /// 创建空订单簿
    pub fn new() -> Self {
        Self::with_block_capacity(NodePool::<OrderNode>::DEFAULT_BLOCK_CAPACITY)
    }

    /// 创建空订单簿并指定节点池块容量（调优参数）
    pub fn with_block_capacity(block_capacity: usize) -> Self {
        OrderBook {
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            order_lookup: HashMap::new(),
            pool: NodePool::with_block_capacity(block_capacity),
        }
    }

    /// 新增一笔挂单
    ///
    /// 节点挂到 (side, price) 价格层队列的尾部，保持到达顺序即时间优先。
    /// id 已存在时拒绝并返回 `DuplicateOrderId`，簿内状态不变；
    /// 绝不静默覆盖旧映射（那会把旧节点变成孤儿并破坏层总量）
    pub fn add_order(&mut self, order: Order) -> Result<(), OrderBookError> {
        if self.order_lookup.contains_key(&order.order_id) {
            return Err(OrderBookError::DuplicateOrderId(order.order_id));
        }

        let node_index = self.pool.allocate(OrderNode {
            order_id: order.order_id,
            side: order.side,
            price: order.price,
            quantity: order.quantity,
            timestamp_ns: order.timestamp_ns,
            next: None,
            prev: None,
        });
        self.order_lookup.insert(order.order_id, node_index);
        self.link_at_tail(node_index, order.side, order.price, order.quantity);

        trace!(
            order_id = order.order_id,
            price = order.price,
            quantity = order.quantity,
            "order added"
        );
        Ok(())
    }

    /// 撤销一笔挂单
    ///
    /// 失败（订单不存在或索引失配）时簿内状态不变
    pub fn cancel_order(&mut self, order_id: u64) -> Result<(), OrderBookError> {
        let node_index = match self.order_lookup.get(&order_id) {
            Some(&index) => index,
            None => return Err(OrderBookError::OrderNotFound(order_id)),
        };

        self.unlink_from_level(node_index)?;
        self.order_lookup.remove(&order_id);
        self.pool.deallocate(node_index);

        trace!(order_id, "order cancelled");
        Ok(())
    }

    /// 修改一笔挂单的价格和数量
    ///
    /// - 数量为 0：完全等价于 `cancel_order`，包括返回值
    /// - 价格不变（精确相等）：原地改量，队列位置即时间优先级保持不变，
    ///   增量减量一视同仁
    /// - 价格改变：按撤单方式摘离旧价格层（空层同样被删除），
    ///   再作为最新到达挂到新价格层的尾部（改价必然丧失时间优先级）
    pub fn amend_order(
        &mut self,
        order_id: u64,
        new_price: f64,
        new_quantity: u64,
    ) -> Result<(), OrderBookError> {
        if new_quantity == 0 {
            return self.cancel_order(order_id);
        }

        let node_index = match self.order_lookup.get(&order_id) {
            Some(&index) => index,
            None => return Err(OrderBookError::OrderNotFound(order_id)),
        };

        let (side, old_price, old_quantity) = {
            let node = &self.pool[node_index];
            (node.side, node.price, node.quantity)
        };

        if new_price == old_price {
            // 同价改量：只动数量和层总量
            let side_map = match side {
                Side::Buy => &mut self.bids,
                Side::Sell => &mut self.asks,
            };
            let level = side_map
                .get_mut(&PriceKey(old_price))
                .ok_or(OrderBookError::LevelInconsistency(order_id))?;

            level.total_quantity = level.total_quantity - old_quantity + new_quantity;
            self.pool[node_index].quantity = new_quantity;
        } else {
            self.unlink_from_level(node_index)?;

            {
                let node = &mut self.pool[node_index];
                node.price = new_price;
                node.quantity = new_quantity;
            }
            self.link_at_tail(node_index, side, new_price, new_quantity);
        }

        trace!(order_id, new_price, new_quantity, "order amended");
        Ok(())
    }

    /// 获取盘口快照
    ///
    /// 两侧各返回至多 `depth` 个 (价格, 总量) 档位，最优价在前。
    /// `depth = 0` 返回两个空序列；深度超过现有档位数时返回全部档位。
    /// 只读操作，不触碰节点池
    pub fn get_snapshot(&self, depth: usize) -> BookSnapshot {
        let bids = self
            .bids
            .iter()
            .rev() // 买侧按价格从高到低
            .take(depth)
            .map(|(key, level)| LevelView {
                price: key.0,
                total_quantity: level.total_quantity,
            })
            .collect();

        let asks = self
            .asks
            .iter()
            .take(depth)
            .map(|(key, level)| LevelView {
                price: key.0,
                total_quantity: level.total_quantity,
            })
            .collect();

        BookSnapshot { bids, asks }
    }

    /// 最优买价
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.keys().next_back().map(|key| key.0)
    }

    /// 最优卖价
    pub fn best_ask(&self) -> Option<f64> {
        self.asks.keys().next().map(|key| key.0)
    }

    /// 买卖价差，任一侧为空时为 `None`
    pub fn spread(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    /// 簿内挂单总数
    pub fn order_count(&self) -> usize {
        self.order_lookup.len()
    }

    /// 簿内是否没有挂单
    pub fn is_empty(&self) -> bool {
        self.order_lookup.is_empty()
    }

    /// 按队列顺序（最早到达在前）返回某价位的全部订单号
    ///
    /// 供撮合层和诊断工具遍历层内队列；该价位没有挂单时返回空
    pub fn level_orders(&self, side: Side, price: f64) -> Vec<u64> {
        let side_map = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };

        let mut order_ids = Vec::new();
        if let Some(level) = side_map.get(&PriceKey(price)) {
            let mut current_node_idx = level.head;
            while let Some(node_idx) = current_node_idx {
                let node = &self.pool[node_idx];
                order_ids.push(node.order_id);
                current_node_idx = node.next;
            }
        }
        order_ids
    }

    // 把节点挂到 (side, price) 价格层队列的尾部，没有该层则先建层
    fn link_at_tail(&mut self, node_index: usize, side: Side, price: f64, quantity: u64) {
        let side_map = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let level = side_map.entry(PriceKey(price)).or_insert(PriceLevel {
            total_quantity: 0,
            head: None,
            tail: None,
        });

        level.total_quantity += quantity;

        if let Some(tail_index) = level.tail {
            self.pool[tail_index].next = Some(node_index);
            self.pool[node_index].prev = Some(tail_index);
            level.tail = Some(node_index);
        } else {
            // 队列为空
            level.head = Some(node_index);
            level.tail = Some(node_index);
        }
    }

    // 把节点从其所在价格层的队列中摘除，层空则连层一起删除
    //
    // 不回收节点存储，也不动 order_lookup，由调用方决定节点的去向。
    // 找不到价格层时返回 LevelInconsistency 且不做任何修改
    fn unlink_from_level(&mut self, node_index: usize) -> Result<(), OrderBookError> {
        let (order_id, side, price, quantity, prev, next) = {
            let node = &self.pool[node_index];
            (
                node.order_id,
                node.side,
                node.price,
                node.quantity,
                node.prev,
                node.next,
            )
        };

        let side_map = match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        };
        let key = PriceKey(price);
        let level = match side_map.get_mut(&key) {
            Some(level) => level,
            None => return Err(OrderBookError::LevelInconsistency(order_id)),
        };

        level.total_quantity -= quantity;

        if let Some(prev_index) = prev {
            self.pool[prev_index].next = next;
        } else {
            // 节点是头节点
            level.head = next;
        }
        if let Some(next_index) = next {
            self.pool[next_index].prev = prev;
        } else {
            // 节点是尾节点
            level.tail = prev;
        }

        if level.head.is_none() {
            side_map.remove(&key);
        }

        self.pool[node_index].prev = None;
        self.pool[node_index].next = None;
        Ok(())
    }
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(id: u64, side: Side, price: f64, quantity: u64) -> Order {
        Order {
            order_id: id,
            side,
            price,
            quantity,
            timestamp_ns: id,
        }
    }

    // 校验全部结构不变量：
    // - 每层总量等于成员数量之和，空层不存在
    // - 链表前后指针互逆，head/tail 是真实端点
    // - order_lookup 的定义域恰好是簿内全部节点，池内存活数一致
    fn assert_invariants(book: &OrderBook) {
        let mut resident = 0usize;

        for (side, side_map) in [(Side::Buy, &book.bids), (Side::Sell, &book.asks)] {
            for (key, level) in side_map {
                assert!(level.head.is_some(), "empty level must be erased");

                let mut sum = 0u64;
                let mut prev: Option<usize> = None;
                let mut current = level.head;
                while let Some(index) = current {
                    let node = &book.pool[index];
                    assert_eq!(node.prev, prev);
                    assert_eq!(node.side, side);
                    assert_eq!(PriceKey(node.price), *key);
                    assert_eq!(book.order_lookup.get(&node.order_id), Some(&index));

                    sum += node.quantity;
                    resident += 1;
                    prev = current;
                    current = node.next;
                }
                assert_eq!(level.tail, prev);
                assert_eq!(level.total_quantity, sum);
            }
        }

        assert_eq!(book.order_lookup.len(), resident);
        assert_eq!(book.pool.len(), resident);
    }

    #[test]
    fn test_add_aggregates_level_quantity() {
        let mut book = OrderBook::new();

        book.add_order(order(1, Side::Buy, 100.0, 50)).unwrap();
        book.add_order(order(2, Side::Buy, 100.0, 30)).unwrap();

        let snapshot = book.get_snapshot(1);
        assert_eq!(
            &snapshot.bids[..],
            &[LevelView {
                price: 100.0,
                total_quantity: 80
            }]
        );
        assert_invariants(&book);
    }

    #[test]
    fn test_duplicate_id_rejected_without_mutation() {
        let mut book = OrderBook::new();
        book.add_order(order(1, Side::Buy, 100.0, 50)).unwrap();

        let before = book.get_snapshot(10);
        let result = book.add_order(order(1, Side::Sell, 101.0, 7));

        assert_eq!(result, Err(OrderBookError::DuplicateOrderId(1)));
        assert_eq!(book.get_snapshot(10), before);
        assert_eq!(book.order_count(), 1);
        assert_invariants(&book);
    }

    #[test]
    fn test_cancel_unlinks_middle_node() {
        let mut book = OrderBook::new();
        book.add_order(order(1, Side::Sell, 99.5, 10)).unwrap();
        book.add_order(order(2, Side::Sell, 99.5, 20)).unwrap();
        book.add_order(order(3, Side::Sell, 99.5, 30)).unwrap();

        book.cancel_order(2).unwrap();

        assert_eq!(book.level_orders(Side::Sell, 99.5), vec![1, 3]);
        assert_eq!(book.get_snapshot(1).asks[0].total_quantity, 40);
        assert_invariants(&book);
    }

    #[test]
    fn test_cancel_last_order_erases_level() {
        let mut book = OrderBook::new();
        book.add_order(order(1, Side::Buy, 100.0, 50)).unwrap();

        book.cancel_order(1).unwrap();

        assert!(book.get_snapshot(10).bids.is_empty());
        assert_eq!(book.best_bid(), None);
        assert_invariants(&book);
    }

    #[test]
    fn test_cancel_unknown_id_fails_cleanly() {
        let mut book = OrderBook::new();
        book.add_order(order(1, Side::Buy, 100.0, 50)).unwrap();

        assert_eq!(book.cancel_order(42), Err(OrderBookError::OrderNotFound(42)));
        assert_eq!(book.order_count(), 1);
        assert_invariants(&book);
    }

    #[test]
    fn test_amend_same_price_keeps_queue_position() {
        let mut book = OrderBook::new();
        book.add_order(order(1, Side::Buy, 100.0, 10)).unwrap();
        book.add_order(order(2, Side::Buy, 100.0, 20)).unwrap();
        book.add_order(order(3, Side::Buy, 100.0, 30)).unwrap();

        // 加量和减量都不挪动队列位置
        book.amend_order(2, 100.0, 200).unwrap();
        assert_eq!(book.level_orders(Side::Buy, 100.0), vec![1, 2, 3]);

        book.amend_order(2, 100.0, 5).unwrap();
        assert_eq!(book.level_orders(Side::Buy, 100.0), vec![1, 2, 3]);
        assert_eq!(book.get_snapshot(1).bids[0].total_quantity, 45);
        assert_invariants(&book);
    }

    #[test]
    fn test_amend_price_moves_to_tail_of_new_level() {
        let mut book = OrderBook::new();
        book.add_order(order(1, Side::Sell, 101.0, 10)).unwrap();
        book.add_order(order(2, Side::Sell, 102.0, 20)).unwrap();

        // 改到已有订单的价位，必须排到该层队尾
        book.amend_order(2, 101.0, 20).unwrap();

        assert_eq!(book.level_orders(Side::Sell, 101.0), vec![1, 2]);
        assert!(book.level_orders(Side::Sell, 102.0).is_empty());
        assert_eq!(book.get_snapshot(10).asks.len(), 1);
        assert_invariants(&book);
    }

    #[test]
    fn test_amend_to_zero_quantity_cancels() {
        let mut book = OrderBook::new();
        book.add_order(order(1, Side::Buy, 100.0, 50)).unwrap();

        book.amend_order(1, 100.0, 0).unwrap();

        assert!(book.is_empty());
        assert_eq!(
            book.amend_order(1, 100.0, 0),
            Err(OrderBookError::OrderNotFound(1))
        );
        assert_invariants(&book);
    }

    #[test]
    fn test_snapshot_depth_truncation() {
        let mut book = OrderBook::new();
        for i in 0..5u64 {
            book.add_order(order(i + 1, Side::Buy, 100.0 - i as f64, 10))
                .unwrap();
            book.add_order(order(i + 101, Side::Sell, 101.0 + i as f64, 10))
                .unwrap();
        }

        let snapshot = book.get_snapshot(0);
        assert!(snapshot.bids.is_empty());
        assert!(snapshot.asks.is_empty());

        let snapshot = book.get_snapshot(3);
        assert_eq!(snapshot.bids.len(), 3);
        assert_eq!(snapshot.asks.len(), 3);

        // 深度超过档位数时返回全部档位，不补齐
        let snapshot = book.get_snapshot(100);
        assert_eq!(snapshot.bids.len(), 5);
        assert_eq!(snapshot.asks.len(), 5);
        assert_invariants(&book);
    }

    #[test]
    fn test_snapshot_best_first_ordering() {
        let mut book = OrderBook::new();
        for (id, price) in [(1u64, 99.0), (2, 101.0), (3, 100.0)] {
            book.add_order(order(id, Side::Buy, price, 10)).unwrap();
            book.add_order(order(id + 10, Side::Sell, price + 10.0, 10))
                .unwrap();
        }

        let snapshot = book.get_snapshot(10);
        let bid_prices: Vec<f64> = snapshot.bids.iter().map(|l| l.price).collect();
        let ask_prices: Vec<f64> = snapshot.asks.iter().map(|l| l.price).collect();

        assert_eq!(bid_prices, vec![101.0, 100.0, 99.0]);
        assert_eq!(ask_prices, vec![109.0, 110.0, 111.0]);
    }

    #[test]
    fn test_node_storage_recycled_after_cancel() {
        let mut book = OrderBook::with_block_capacity(4);

        for round in 0..10u64 {
            let id = round + 1;
            book.add_order(order(id, Side::Buy, 100.0, 10)).unwrap();
            book.cancel_order(id).unwrap();
        }

        // 同一时刻最多一个存活节点，池不应超过一个块
        assert_eq!(book.pool.capacity(), 4);
        assert_invariants(&book);
    }

    #[test]
    fn test_best_prices_and_spread() {
        let mut book = OrderBook::new();
        assert_eq!(book.spread(), None);

        book.add_order(order(1, Side::Buy, 99.5, 10)).unwrap();
        book.add_order(order(2, Side::Buy, 100.0, 10)).unwrap();
        book.add_order(order(3, Side::Sell, 100.5, 10)).unwrap();

        assert_eq!(book.best_bid(), Some(100.0));
        assert_eq!(book.best_ask(), Some(100.5));
        assert_eq!(book.spread(), Some(0.5));
    }
}
