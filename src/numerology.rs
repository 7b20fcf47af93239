use serde::Serialize;

use crate::error::{BlueprintError, Result};

/// The five digit-reduction numbers derived from a name and birth date.
/// Entirely independent of the astronomical pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Numerology {
    pub life_path: u32,
    pub expression: u32,
    pub soul_urge: u32,
    pub personality: u32,
    pub birth_day: u32,
}

/// Chinese zodiac attribution for a birth year (sexagenary cycle).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChineseZodiac {
    pub animal: &'static str,
    pub element: &'static str,
    pub yin_yang: &'static str,
}

const ANIMALS: [&str; 12] = [
    "Rat", "Ox", "Tiger", "Rabbit", "Dragon", "Snake", "Horse", "Goat", "Monkey", "Rooster",
    "Dog", "Pig",
];

const ELEMENTS: [&str; 5] = ["Wood", "Fire", "Earth", "Metal", "Water"];

/// Repeatedly sums decimal digits until the value is a single digit or one
/// of the master numbers 11, 22, 33. Idempotent on already-reduced values.
pub fn reduce(mut n: u32) -> u32 {
    while n > 9 && n != 11 && n != 22 && n != 33 {
        n = digit_sum(n);
    }
    n
}

/// Birth Day reduction honors the master-number exception only for 11/22.
fn reduce_birth_day(mut n: u32) -> u32 {
    while n > 9 && n != 11 && n != 22 {
        n = digit_sum(n);
    }
    n
}

fn digit_sum(mut n: u32) -> u32 {
    let mut sum = 0;
    while n > 0 {
        sum += n % 10;
        n /= 10;
    }
    sum
}

/// Pythagorean letter value: A=1 .. I=9, J=1 .. R=9, S=1 .. Z=8.
fn letter_value(c: char) -> Option<u32> {
    if c.is_ascii_alphabetic() {
        Some((c.to_ascii_uppercase() as u32 - 'A' as u32) % 9 + 1)
    } else {
        None
    }
}

fn is_vowel(c: char) -> bool {
    matches!(c.to_ascii_uppercase(), 'A' | 'E' | 'I' | 'O' | 'U')
}

/// Life Path: sum of every digit in the calendar date string, reduced.
pub fn life_path(birth_date: &str) -> Result<u32> {
    let sum: u32 = birth_date.chars().filter_map(|c| c.to_digit(10)).sum();
    if sum == 0 {
        return Err(BlueprintError::invalid_input(format!(
            "birth date {:?} contains no digits",
            birth_date
        )));
    }
    Ok(reduce(sum))
}

/// Expression: Pythagorean sum over every letter of the full name, reduced.
pub fn expression(full_name: &str) -> u32 {
    reduce(full_name.chars().filter_map(letter_value).sum())
}

/// Soul Urge: vowels only.
pub fn soul_urge(full_name: &str) -> u32 {
    reduce(
        full_name
            .chars()
            .filter(|c| is_vowel(*c))
            .filter_map(letter_value)
            .sum(),
    )
}

/// Personality: consonants only.
pub fn personality(full_name: &str) -> u32 {
    reduce(
        full_name
            .chars()
            .filter(|c| c.is_ascii_alphabetic() && !is_vowel(*c))
            .filter_map(letter_value)
            .sum(),
    )
}

/// Birth Day: the day-of-month digits, reduced with the 11/22 exception.
pub fn birth_day(birth_date: &str) -> Result<u32> {
    let day: u32 = birth_date
        .trim()
        .rsplit('-')
        .next()
        .and_then(|d| d.parse().ok())
        .ok_or_else(|| {
            BlueprintError::invalid_input(format!("cannot read day of month from {:?}", birth_date))
        })?;
    Ok(reduce_birth_day(day))
}

pub fn calculate(full_name: &str, birth_date: &str) -> Result<Numerology> {
    Ok(Numerology {
        life_path: life_path(birth_date)?,
        expression: expression(full_name),
        soul_urge: soul_urge(full_name),
        personality: personality(full_name),
        birth_day: birth_day(birth_date)?,
    })
}

/// Chinese zodiac: 12-year animal cycle and 10-year element cycle, both
/// anchored at 4 CE; even years are Yang, odd years Yin.
pub fn chinese_zodiac(year: i32) -> ChineseZodiac {
    let animal = ANIMALS[(year - 4).rem_euclid(12) as usize];
    let element = ELEMENTS[((year - 4).rem_euclid(10) / 2) as usize];
    ChineseZodiac {
        animal,
        element,
        yin_yang: if year % 2 == 0 { "Yang" } else { "Yin" },
    }
}
