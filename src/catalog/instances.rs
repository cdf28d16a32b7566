//! Instance maps, difficulties and boss names.
//!
//! Boss tables list every `encounterEntry` a boss has been reported under:
//! the creature entry used by older panel builds and the encounter id used
//! after the combat log rework. Multi-creature fights list each creature.

/// Display name of an instance map.
pub fn map_name(map: i32) -> Option<&'static str> {
    let name = match map {
        249 => "Логово Ониксии",
        533 => "Наксрамас",
        603 => "Ульдуар",
        615 => "Обсидиановое святилище",
        616 => "Око Вечности",
        624 => "Склеп Аркавона",
        631 => "Цитадель Ледяной Короны",
        649 => "Испытание крестоносца",
        724 => "Рубиновое святилище",
        _ => return None,
    };
    Some(name)
}

/// Display label of a raid difficulty id.
pub fn difficulty_name(difficulty: i32) -> Option<&'static str> {
    let name = match difficulty {
        0 => "10 об.",
        1 => "25 об.",
        2 => "10 гер.",
        3 => "25 гер.",
        _ => return None,
    };
    Some(name)
}

/// Raid type display name, e.g. `"Наксрамас (25 об.)"`.
///
/// Unknown maps produce `None` so a later table revision can backfill it.
pub fn raid_type_name(map: i32, difficulty: i32) -> Option<String> {
    let map = map_name(map)?;
    Some(match difficulty_name(difficulty) {
        Some(label) => format!("{map} ({label})"),
        None => format!("{map} (сложность {difficulty})"),
    })
}

type BossTable = &'static [(&'static [i32], &'static str)];

const NAXXRAMAS: BossTable = &[
    (&[15956, 1107], "Ануб'Рекан"),
    (&[15953, 1110], "Великая вдова Фарлина"),
    (&[15952, 1116], "Мексна"),
    (&[15954, 1117], "Нот Чумной"),
    (&[15936, 1112], "Хейган Нечестивый"),
    (&[16011, 1115], "Лотхиб"),
    (&[16061, 1113], "Инструктор Разувий"),
    (&[16060, 1109], "Готик Жнец"),
    (&[16064, 16065, 30549, 16063, 1121], "Четыре всадника"),
    (&[16028, 1118], "Лоскутик"),
    (&[15931, 1111], "Гроббулус"),
    (&[15932, 1108], "Глут"),
    (&[15928, 1120], "Таддиус"),
    (&[15989, 1119], "Сапфирон"),
    (&[15990, 1114], "Кел'Тузад"),
];

const ONYXIA: BossTable = &[(&[10184, 1084], "Ониксия")];

const OBSIDIAN_SANCTUM: BossTable = &[(&[28860, 742], "Сартарион")];

const EYE_OF_ETERNITY: BossTable = &[(&[28859, 734], "Малигос")];

const VAULT_OF_ARCHAVON: BossTable = &[
    (&[31125, 772], "Аркавон Каменный Страж"),
    (&[33993, 774], "Эмалон Страж Бури"),
    (&[35013, 776], "Коралон Страж Огня"),
    (&[38433, 885], "Торавон Страж Льда"),
];

const ULDUAR: BossTable = &[
    (&[33113, 744], "Огненный Левиафан"),
    (&[33118, 745], "Повелитель Горнов Игнис"),
    (&[33186, 746], "Острокрылая"),
    (&[33293, 747], "Разрушитель XT-002"),
    (&[32867, 32927, 32857, 748], "Железное собрание"),
    (&[32930, 749], "Кологарн"),
    (&[33515, 750], "Ауриайя"),
    (&[32845, 751], "Ходир"),
    (&[32865, 752], "Торим"),
    (&[32906, 753], "Фрейя"),
    (&[33350, 33432, 33651, 33670, 754], "Мимирон"),
    (&[33271, 755], "Генерал Везакс"),
    (&[33288, 756], "Йогг-Сарон"),
    (&[32871, 757], "Алгалон Наблюдатель"),
];

const TRIAL_OF_THE_CRUSADER: BossTable = &[
    (&[34796, 35144, 34799, 34797, 629], "Чудовища Нордскола"),
    (&[34780, 633], "Лорд Джараксус"),
    (&[34458, 34461, 637], "Чемпионы фракций"),
    (&[34497, 34496, 641], "Валь'киры-близнецы"),
    (&[34564, 645], "Ануб'арак"),
];

const ICECROWN_CITADEL: BossTable = &[
    (&[36612, 845], "Лорд Ребрад"),
    (&[36855, 846], "Леди Смертный Шепот"),
    (&[36939, 36948, 847], "Бой на кораблях"),
    (&[37813, 848], "Саурфанг Смертоносный"),
    (&[36626, 849], "Тухлопуз"),
    (&[36627, 850], "Гниломорд"),
    (&[36678, 851], "Профессор Мерзоцид"),
    (&[37970, 37972, 37973, 852], "Кровавый совет"),
    (&[37955, 853], "Кровавая королева Лана'тель"),
    (&[36789, 854], "Валитрия Сновидица"),
    (&[36853, 855], "Синдрагоса"),
    (&[36597, 856], "Король-лич"),
];

const RUBY_SANCTUM: BossTable = &[(&[39863, 40142, 887], "Халион")];

fn boss_table(map: i32) -> Option<BossTable> {
    let table = match map {
        249 => ONYXIA,
        533 => NAXXRAMAS,
        603 => ULDUAR,
        615 => OBSIDIAN_SANCTUM,
        616 => EYE_OF_ETERNITY,
        624 => VAULT_OF_ARCHAVON,
        631 => ICECROWN_CITADEL,
        649 => TRIAL_OF_THE_CRUSADER,
        724 => RUBY_SANCTUM,
        _ => return None,
    };
    Some(table)
}

/// Canonical boss name for an encounter entry inside a given instance.
pub fn encounter_name(map: i32, encounter_entry: i32) -> Option<&'static str> {
    boss_table(map)?
        .iter()
        .find(|(aliases, _)| aliases.contains(&encounter_entry))
        .map(|(_, name)| *name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_raid_type_name() {
        assert_eq!(
            raid_type_name(533, 1).as_deref(),
            Some("Наксрамас (25 об.)")
        );
        assert_eq!(
            raid_type_name(631, 9).as_deref(),
            Some("Цитадель Ледяной Короны (сложность 9)")
        );
        assert_eq!(raid_type_name(1, 0), None);
    }

    #[test]
    fn test_aliases_resolve_to_one_name() {
        assert_eq!(encounter_name(533, 15956), Some("Ануб'Рекан"));
        assert_eq!(encounter_name(533, 1107), Some("Ануб'Рекан"));
        assert_eq!(encounter_name(533, 30549), Some("Четыре всадника"));
        assert_eq!(encounter_name(533, 16064), Some("Четыре всадника"));
    }

    #[test]
    fn test_entry_is_scoped_to_its_instance() {
        assert_eq!(encounter_name(603, 15956), None);
        assert_eq!(encounter_name(9999, 15956), None);
    }

    #[test]
    fn test_no_alias_is_shared_between_bosses() {
        for map in [249, 533, 603, 615, 616, 624, 631, 649, 724] {
            let table = boss_table(map).unwrap();
            let mut seen = HashSet::new();
            for (aliases, name) in table {
                for alias in *aliases {
                    assert!(seen.insert(*alias), "{alias} repeated in map {map} ({name})");
                }
            }
        }
    }
}
