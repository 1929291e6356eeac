//! 世界快照：由数据同步职责每个 tick 刷新，其余职责只读
//!
//! 只保存控制核心做决策需要的字段（位置、等级、金币、药水、装备、佣兵、回城手段）。

use std::sync::{Arc, RwLock};

use serde::Serialize;

/// 世界坐标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// 读取失败时内存读到的是全零坐标
    pub fn is_valid(&self) -> bool {
        self.x != 0 || self.y != 0
    }

    pub fn distance(&self, other: &Position) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        (dx * dx + dy * dy).sqrt()
    }
}

/// 某一种药水的供应情况
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PotionSupply {
    /// 腰带里现有数量
    pub in_belt: u32,
    /// 腰带里还差多少个才满
    pub missing_in_belt: u32,
    /// 背包里可用于补充的数量
    pub in_inventory: u32,
}

impl PotionSupply {
    pub fn needs_refill(&self) -> bool {
        self.missing_in_belt > 0
    }

    /// 已经满了，或者背包里有可补充的
    pub fn satisfiable(&self) -> bool {
        !self.needs_refill() || self.in_inventory > 0
    }

    pub fn any_available(&self) -> bool {
        self.in_belt > 0 || self.in_inventory > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum MercState {
    #[default]
    None,
    Alive,
    Dead,
}

/// 一次读取得到的游戏世界状态
#[derive(Debug, Clone, Default, Serialize)]
pub struct WorldState {
    pub in_game: bool,
    pub area: String,
    pub in_town: bool,
    pub position: Position,
    pub level: u32,
    pub gold: u64,
    pub healing: PotionSupply,
    pub mana: PotionSupply,
    pub rejuvenation: PotionSupply,
    /// 有耐久归零的装备
    pub equipment_broken: bool,
    pub merc: MercState,
    pub merc_revive_cost: u64,
    /// 已为回城卷轴/技能绑定按键
    pub town_portal_bound: bool,
    pub town_portal_charges: u32,
}

impl WorldState {
    /// 回城判定与原因日志共用这一个谓词
    pub fn equipment_broken(&self) -> bool {
        self.equipment_broken
    }

    pub fn merc_dead(&self) -> bool {
        self.merc == MercState::Dead
    }
}

/// 多职责共享的世界快照
#[derive(Debug, Clone, Default)]
pub struct SharedWorld {
    inner: Arc<RwLock<WorldState>>,
}

impl SharedWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> WorldState {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn replace(&self, state: WorldState) {
        *self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }

    pub fn position(&self) -> Position {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .position
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_validity_and_distance() {
        assert!(!Position::default().is_valid());
        assert!(Position::new(0, 5).is_valid());
        let d = Position::new(0, 0).distance(&Position::new(3, 4));
        assert!((d - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_potion_supply_predicates() {
        let full = PotionSupply {
            in_belt: 4,
            missing_in_belt: 0,
            in_inventory: 0,
        };
        assert!(full.satisfiable());
        let empty = PotionSupply {
            in_belt: 0,
            missing_in_belt: 4,
            in_inventory: 0,
        };
        assert!(!empty.satisfiable());
        assert!(!empty.any_available());
    }

    #[test]
    fn test_shared_world_replace() {
        let world = SharedWorld::new();
        world.replace(WorldState {
            position: Position::new(10, 20),
            ..Default::default()
        });
        assert_eq!(world.position(), Position::new(10, 20));
    }
}
