/// 订单簿负载生成器与盘口打印工具
///
/// 在进程内直接驱动 OrderBook（不经过任何传输层），用随机的
/// 新增/撤销/改单流测量吞吐量，结束后通过快照接口打印最终盘口。
/// 盘口打印只消费 `get_snapshot`，不依赖簿的内部表示。
use clap::Parser;
use limit_orderbook::orderbook::OrderBook;
use limit_orderbook::protocol::{Order, Side};
use limit_orderbook::timestamp::BatchClock;
use rand::Rng;
use std::time::Instant;

/// 负载生成器命令行配置
#[derive(Parser, Debug, Clone)]
#[command(name = "load-generator")]
#[command(version = "0.1.0")]
#[command(about = "订单簿吞吐量测试与盘口打印", long_about = None)]
struct Config {
    /// 生成的操作总数
    #[arg(short = 'n', long, default_value_t = 1_000_000)]
    operations: u64,

    /// 价格中枢
    #[arg(long, default_value_t = 100.0)]
    mid_price: f64,

    /// 每侧价格档位数量
    #[arg(long, default_value_t = 50)]
    price_levels: u64,

    /// 最小变动价位
    #[arg(long, default_value_t = 0.01)]
    tick: f64,

    /// 最终快照深度
    #[arg(short, long, default_value_t = 10)]
    depth: usize,

    /// 以JSON输出最终快照
    #[arg(long, default_value_t = false)]
    json: bool,

    /// 日志级别
    #[arg(short = 'l', long, default_value = "info", value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: String,
}

fn main() {
    let config = Config::parse();
    init_logging(&config.log_level);

    tracing::info!("负载生成器启动");
    tracing::info!("配置: {:?}", config);

    let mut book = OrderBook::new();
    let mut rng = rand::thread_rng();
    let mut clock = BatchClock::new();

    let mut next_order_id: u64 = 1;
    let mut live_ids: Vec<u64> = Vec::new();

    let mut adds: u64 = 0;
    let mut cancels: u64 = 0;
    let mut amends: u64 = 0;

    // 随机价格落在中枢上下各 price_levels 个tick的离散网格上，
    // 同一档位算出的 f64 完全一致，保证精确相等的层归属
    let grid = |offset: i64, cfg: &Config| cfg.mid_price + offset as f64 * cfg.tick;

    let start = Instant::now();
    for _ in 0..config.operations {
        let roll: f64 = rng.gen();

        if live_ids.is_empty() || roll < 0.60 {
            // 新增：买单挂在中枢下方，卖单挂在中枢上方
            let is_buy = rng.gen_bool(0.5);
            let levels = config.price_levels as i64;
            let (side, offset) = if is_buy {
                (Side::Buy, -rng.gen_range(1..=levels))
            } else {
                (Side::Sell, rng.gen_range(1..=levels))
            };

            let order = Order {
                order_id: next_order_id,
                side,
                price: grid(offset, &config),
                quantity: rng.gen_range(1..=500),
                timestamp_ns: clock.now_ns(),
            };
            if book.add_order(order).is_ok() {
                live_ids.push(next_order_id);
                adds += 1;
            }
            next_order_id += 1;
        } else if roll < 0.85 {
            // 撤销一笔随机存活订单
            let pick = rng.gen_range(0..live_ids.len());
            let order_id = live_ids.swap_remove(pick);
            if book.cancel_order(order_id).is_ok() {
                cancels += 1;
            }
        } else {
            // 改单：随机新价（可能与原价相同）和新数量
            let pick = rng.gen_range(0..live_ids.len());
            let order_id = live_ids[pick];
            let levels = config.price_levels as i64;
            let offset = rng.gen_range(-levels..=levels);
            let new_quantity = rng.gen_range(1..=500);

            if book.amend_order(order_id, grid(offset, &config), new_quantity).is_ok() {
                amends += 1;
            }
        }
    }
    let elapsed = start.elapsed();

    let total = adds + cancels + amends;
    println!("\n--- 测试结果 ---");
    println!("总操作数: {}", total);
    println!("耗时: {:?}", elapsed);
    println!(
        "吞吐量 (ops/s): {:.2}",
        total as f64 / elapsed.as_secs_f64()
    );
    println!("新增 / 撤销 / 改单: {} / {} / {}", adds, cancels, amends);
    println!("簿内剩余订单: {}", book.order_count());

    // 盘口打印：快照的只读消费方
    let snapshot = book.get_snapshot(config.depth);
    if config.json {
        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("快照序列化失败: {}", e),
        }
    } else {
        println!("\nBids:");
        for level in &snapshot.bids {
            println!("{} : {}", level.price, level.total_quantity);
        }
        println!("Asks:");
        for level in &snapshot.asks {
            println!("{} : {}", level.price, level.total_quantity);
        }
    }
}

fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
