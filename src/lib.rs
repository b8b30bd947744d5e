// 全局内存分配器：使用 jemalloc
// 节点池已让热路径免于常规分配，剩下的冷路径分配（索引、快照）交给 jemalloc
#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

// 将所有模块声明为公共的，这样二进制文件、测试和基准测试都能访问它们
pub mod orderbook;
pub mod pool;
pub mod protocol;
pub mod timestamp;
