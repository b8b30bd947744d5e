/// 定长块节点池
///
/// 为订单节点提供 allocate/deallocate 服务的对象池：
/// - 按固定大小的块批量向系统申请存储，热路径上不再触发常规分配
/// - 空闲槽位通过 free list 复用，分配/回收均摊 O(1)
/// - 槽位用普通 `usize` 句柄寻址，块一旦开辟便不再移动或单独释放
///
/// 块容量只是调优常数，不影响正确性。整个池的存储在池销毁时一次性归还。
use std::ops::{Index, IndexMut};

/// 基于 free list 的块状对象池
#[derive(Debug, Clone)]
pub struct NodePool<T> {
    /// 已开辟的块，每块 `block_capacity` 个槽位
    blocks: Vec<Box<[Option<T>]>>,

    /// 可复用的槽位句柄（LIFO）
    free_list: Vec<usize>,

    /// 每块槽位数（固定）
    block_capacity: usize,

    /// 当前存活对象数
    live: usize,
}

impl<T> NodePool<T> {
    /// 默认块容量
    pub const DEFAULT_BLOCK_CAPACITY: usize = 1024;

    /// 创建默认块容量的池
    pub fn new() -> Self {
        Self::with_block_capacity(Self::DEFAULT_BLOCK_CAPACITY)
    }

    /// 创建指定块容量的池
    pub fn with_block_capacity(block_capacity: usize) -> Self {
        assert!(block_capacity > 0, "Block capacity must be greater than 0");

        Self {
            blocks: Vec::new(),
            free_list: Vec::new(),
            block_capacity,
            live: 0,
        }
    }

    /// 开辟一个新块，并把其中所有槽位压入 free list
    fn carve_block(&mut self) {
        let base = self.blocks.len() * self.block_capacity;

        let block = (0..self.block_capacity)
            .map(|_| None)
            .collect::<Vec<_>>()
            .into_boxed_slice();
        self.blocks.push(block);

        // 逆序压栈，让句柄按升序被分配出去
        for offset in (0..self.block_capacity).rev() {
            self.free_list.push(base + offset);
        }
    }

    /// 分配一个槽位存放 `value`，返回稳定句柄
    ///
    /// # 性能
    /// 均摊 O(1)：free list 为空时才开辟新块
    #[inline]
    pub fn allocate(&mut self, value: T) -> usize {
        if self.free_list.is_empty() {
            self.carve_block();
        }
        let index = self
            .free_list
            .pop()
            .expect("free list refilled by carve_block");

        self.blocks[index / self.block_capacity][index % self.block_capacity] = Some(value);
        self.live += 1;
        index
    }

    /// 回收句柄对应的槽位，返回其中的对象（随即析构或移交调用方）
    ///
    /// 槽位已空时返回 `None` 且不改变池状态。同一句柄在没有被重新
    /// `allocate` 出去之前不得回收两次。
    #[inline]
    pub fn deallocate(&mut self, index: usize) -> Option<T> {
        let slot = self
            .blocks
            .get_mut(index / self.block_capacity)?
            .get_mut(index % self.block_capacity)?;
        let value = slot.take()?;

        self.live -= 1;
        self.free_list.push(index);
        Some(value)
    }

    /// 只读访问，句柄无效或槽位为空时返回 `None`
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.blocks
            .get(index / self.block_capacity)?
            .get(index % self.block_capacity)?
            .as_ref()
    }

    /// 可变访问，句柄无效或槽位为空时返回 `None`
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.blocks
            .get_mut(index / self.block_capacity)?
            .get_mut(index % self.block_capacity)?
            .as_mut()
    }

    /// 当前存活对象数
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    /// 池中是否没有存活对象
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// 已开辟的总槽位数（高水位，按块粒度取整）
    #[inline]
    pub fn capacity(&self) -> usize {
        self.blocks.len() * self.block_capacity
    }
}

impl<T> Default for NodePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<usize> for NodePool<T> {
    type Output = T;

    #[inline]
    fn index(&self, index: usize) -> &T {
        self.blocks[index / self.block_capacity][index % self.block_capacity]
            .as_ref()
            .expect("slot is vacant")
    }
}

impl<T> IndexMut<usize> for NodePool<T> {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut T {
        self.blocks[index / self.block_capacity][index % self.block_capacity]
            .as_mut()
            .expect("slot is vacant")
    }
}
