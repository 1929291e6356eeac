//! 维护职责的两条决策：腰带补药与回城
//!
//! 都是纯函数，只读世界快照与配置，便于逐条验证边界。

use crate::config::TownTripSection;
use crate::world::WorldState;

/// 腰带补药决策
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeltDecision {
    Refill,
    Skip,
}

/// 红蓝两种药必须能同时满足才补；只有一种能补时不动腰带，交给回城解决。
/// 紫药单独缺少且背包里有时无论红蓝如何都补。
pub fn belt_refill_decision(world: &WorldState) -> BeltDecision {
    let hp_mp_needed = world.healing.needs_refill() || world.mana.needs_refill();
    if hp_mp_needed && world.healing.satisfiable() && world.mana.satisfiable() {
        return BeltDecision::Refill;
    }
    if world.rejuvenation.needs_refill() && world.rejuvenation.in_inventory > 0 {
        return BeltDecision::Refill;
    }
    BeltDecision::Skip
}

/// 回城原因，声明顺序即日志优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TownTripReason {
    NoHealingPotions,
    EquipmentBroken,
    NoManaPotions,
    MercDead,
}

impl std::fmt::Display for TownTripReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TownTripReason::NoHealingPotions => "No healing potions found",
            TownTripReason::EquipmentBroken => "Equipment broken",
            TownTripReason::NoManaPotions => "No mana potions found",
            TownTripReason::MercDead => "Mercenary is dead",
        };
        f.write_str(s)
    }
}

/// 按等级分档的金币门槛：≤5 级 500，<20 级 1000，其余 5000
pub fn gold_threshold(level: u32) -> u64 {
    if level <= 5 {
        500
    } else if level < 20 {
        1000
    } else {
        5000
    }
}

/// 回城判定：已在城里、没有回城手段、金币不足时永不触发；
/// 否则返回第一个成立的触发条件
pub fn town_trip_reason(
    world: &WorldState,
    triggers: &TownTripSection,
    use_merc: bool,
) -> Option<TownTripReason> {
    if world.in_town || !world.town_portal_bound || world.town_portal_charges == 0 {
        return None;
    }
    if world.gold < gold_threshold(world.level) {
        return None;
    }

    if triggers.no_hp_potions && !world.healing.any_available() {
        return Some(TownTripReason::NoHealingPotions);
    }
    if triggers.equipment_broken && world.equipment_broken() {
        return Some(TownTripReason::EquipmentBroken);
    }
    if triggers.no_mp_potions && !world.mana.any_available() {
        return Some(TownTripReason::NoManaPotions);
    }
    if triggers.merc_died && use_merc && world.merc_dead() && world.gold >= world.merc_revive_cost
    {
        return Some(TownTripReason::MercDead);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::{MercState, PotionSupply};

    fn stocked(n: u32) -> PotionSupply {
        PotionSupply {
            in_belt: n,
            missing_in_belt: 0,
            in_inventory: 0,
        }
    }

    fn empty() -> PotionSupply {
        PotionSupply {
            in_belt: 0,
            missing_in_belt: 4,
            in_inventory: 0,
        }
    }

    fn field_world(level: u32, gold: u64) -> WorldState {
        WorldState {
            in_game: true,
            level,
            gold,
            healing: stocked(4),
            mana: stocked(4),
            rejuvenation: stocked(4),
            town_portal_bound: true,
            town_portal_charges: 10,
            ..Default::default()
        }
    }

    #[test]
    fn test_belt_refill_requires_both_types() {
        let mut world = field_world(10, 0);
        world.healing = PotionSupply {
            in_belt: 2,
            missing_in_belt: 2,
            in_inventory: 3,
        };
        world.mana = empty();
        assert_eq!(belt_refill_decision(&world), BeltDecision::Skip);

        world.mana.in_inventory = 2;
        assert_eq!(belt_refill_decision(&world), BeltDecision::Refill);
    }

    #[test]
    fn test_belt_full_is_skip() {
        let world = field_world(10, 0);
        assert_eq!(belt_refill_decision(&world), BeltDecision::Skip);
    }

    #[test]
    fn test_rejuvenation_refills_regardless() {
        let mut world = field_world(10, 0);
        world.healing = empty();
        world.rejuvenation = PotionSupply {
            in_belt: 0,
            missing_in_belt: 4,
            in_inventory: 1,
        };
        assert_eq!(belt_refill_decision(&world), BeltDecision::Refill);
    }

    #[test]
    fn test_gold_tiers() {
        assert_eq!(gold_threshold(1), 500);
        assert_eq!(gold_threshold(5), 500);
        assert_eq!(gold_threshold(6), 1000);
        assert_eq!(gold_threshold(19), 1000);
        assert_eq!(gold_threshold(20), 5000);
    }

    #[test]
    fn test_gold_boundary() {
        let triggers = TownTripSection::default();
        let mut world = field_world(25, 5000);
        world.healing = empty();
        assert_eq!(
            town_trip_reason(&world, &triggers, true),
            Some(TownTripReason::NoHealingPotions)
        );
        world.gold = 4999;
        assert_eq!(town_trip_reason(&world, &triggers, true), None);
    }

    #[test]
    fn test_never_in_town() {
        let triggers = TownTripSection::default();
        let mut world = field_world(25, 100_000);
        world.healing = empty();
        world.in_town = true;
        assert_eq!(town_trip_reason(&world, &triggers, true), None);
    }

    #[test]
    fn test_requires_portal() {
        let triggers = TownTripSection::default();
        let mut world = field_world(25, 100_000);
        world.healing = empty();
        world.town_portal_charges = 0;
        assert_eq!(town_trip_reason(&world, &triggers, true), None);
        world.town_portal_charges = 5;
        world.town_portal_bound = false;
        assert_eq!(town_trip_reason(&world, &triggers, true), None);
    }

    #[test]
    fn test_low_level_with_potions_does_not_fire() {
        let triggers = TownTripSection::default();
        let world = field_world(3, 600);
        assert_eq!(town_trip_reason(&world, &triggers, true), None);
    }

    #[test]
    fn test_high_level_without_healing_fires() {
        let triggers = TownTripSection::default();
        let mut world = field_world(25, 6000);
        world.merc = MercState::None;
        world.healing = empty();
        let reason = town_trip_reason(&world, &triggers, false).unwrap();
        assert_eq!(reason, TownTripReason::NoHealingPotions);
        assert_eq!(reason.to_string(), "No healing potions found");
    }

    #[test]
    fn test_reason_order() {
        let triggers = TownTripSection::default();
        let mut world = field_world(25, 6000);
        world.mana = empty();
        world.equipment_broken = true;
        world.merc = MercState::Dead;
        assert_eq!(
            town_trip_reason(&world, &triggers, true),
            Some(TownTripReason::EquipmentBroken)
        );
        world.equipment_broken = false;
        assert_eq!(
            town_trip_reason(&world, &triggers, true),
            Some(TownTripReason::NoManaPotions)
        );
        world.mana = stocked(2);
        assert_eq!(
            town_trip_reason(&world, &triggers, true),
            Some(TownTripReason::MercDead)
        );
    }

    #[test]
    fn test_merc_dead_needs_gold_and_merc_enabled() {
        let triggers = TownTripSection::default();
        let mut world = field_world(25, 6000);
        world.merc = MercState::Dead;
        world.merc_revive_cost = 10_000;
        assert_eq!(town_trip_reason(&world, &triggers, true), None);
        world.merc_revive_cost = 2_000;
        assert_eq!(town_trip_reason(&world, &triggers, false), None);
    }

    #[test]
    fn test_disabled_trigger_ignored() {
        let triggers = TownTripSection {
            no_hp_potions: false,
            ..Default::default()
        };
        let mut world = field_world(25, 6000);
        world.healing = empty();
        assert_eq!(town_trip_reason(&world, &triggers, true), None);
    }
}
