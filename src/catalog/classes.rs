//! Class and specialization display names.

/// Display name of a character class.
pub fn class_name(class_id: i32) -> Option<&'static str> {
    let name = match class_id {
        1 => "Воин",
        2 => "Паладин",
        3 => "Охотник",
        4 => "Разбойник",
        5 => "Жрец",
        6 => "Рыцарь смерти",
        7 => "Шаман",
        8 => "Маг",
        9 => "Чернокнижник",
        11 => "Друид",
        _ => return None,
    };
    Some(name)
}

/// Display name of a talent specialization, indexed by talent tree.
pub fn spec_name(class_id: i32, spec_id: i32) -> Option<&'static str> {
    let trees: [&str; 3] = match class_id {
        1 => ["Оружие", "Неистовство", "Защита"],
        2 => ["Свет", "Защита", "Воздаяние"],
        3 => ["Повелитель зверей", "Стрельба", "Выживание"],
        4 => ["Ликвидация", "Бой", "Скрытность"],
        5 => ["Послушание", "Свет", "Тьма"],
        6 => ["Кровь", "Лед", "Нечестивость"],
        7 => ["Стихии", "Совершенствование", "Исцеление"],
        8 => ["Тайная магия", "Огонь", "Лед"],
        9 => ["Колдовство", "Демонология", "Разрушение"],
        11 => ["Баланс", "Сила зверя", "Исцеление"],
        _ => return None,
    };
    usize::try_from(spec_id)
        .ok()
        .and_then(|idx| trees.get(idx))
        .copied()
}
