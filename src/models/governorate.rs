use serde::{Deserialize, Serialize};
use std::fmt;

/// Governorate of birth encoded by digits 8-9 of the national identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Governorate {
    Cairo,
    Alexandria,
    PortSaid,
    Suez,
    Damietta,
    Dakahlia,
    Sharqia,
    Qalyubia,
    KafrElSheikh,
    Gharbia,
    Monufia,
    Beheira,
    Ismailia,
    Giza,
    BeniSuef,
    Faiyum,
    Minya,
    Asyut,
    Sohag,
    Qena,
    Aswan,
    Luxor,
    RedSea,
    NewValley,
    Matrouh,
    NorthSinai,
    SouthSinai,
    BornAbroad,
}

// (code, governorate, english name, arabic name)
static GOVERNORATES: [(&str, Governorate, &str, &str); 28] = [
    ("01", Governorate::Cairo, "Cairo", "القاهرة"),
    ("02", Governorate::Alexandria, "Alexandria", "الإسكندرية"),
    ("03", Governorate::PortSaid, "Port Said", "بورسعيد"),
    ("04", Governorate::Suez, "Suez", "السويس"),
    ("11", Governorate::Damietta, "Damietta", "دمياط"),
    ("12", Governorate::Dakahlia, "Dakahlia", "الدقهلية"),
    ("13", Governorate::Sharqia, "Sharqia", "الشرقية"),
    ("14", Governorate::Qalyubia, "Qalyubia", "القليوبية"),
    ("15", Governorate::KafrElSheikh, "Kafr El Sheikh", "كفر الشيخ"),
    ("16", Governorate::Gharbia, "Gharbia", "الغربية"),
    ("17", Governorate::Monufia, "Monufia", "المنوفية"),
    ("18", Governorate::Beheira, "Beheira", "البحيرة"),
    ("19", Governorate::Ismailia, "Ismailia", "الإسماعيلية"),
    ("21", Governorate::Giza, "Giza", "الجيزة"),
    ("22", Governorate::BeniSuef, "Beni Suef", "بني سويف"),
    ("23", Governorate::Faiyum, "Faiyum", "الفيوم"),
    ("24", Governorate::Minya, "Minya", "المنيا"),
    ("25", Governorate::Asyut, "Asyut", "أسيوط"),
    ("26", Governorate::Sohag, "Sohag", "سوهاج"),
    ("27", Governorate::Qena, "Qena", "قنا"),
    ("28", Governorate::Aswan, "Aswan", "أسوان"),
    ("29", Governorate::Luxor, "Luxor", "الأقصر"),
    ("31", Governorate::RedSea, "Red Sea", "البحر الأحمر"),
    ("32", Governorate::NewValley, "New Valley", "الوادي الجديد"),
    ("33", Governorate::Matrouh, "Matrouh", "مطروح"),
    ("34", Governorate::NorthSinai, "North Sinai", "شمال سيناء"),
    ("35", Governorate::SouthSinai, "South Sinai", "جنوب سيناء"),
    ("88", Governorate::BornAbroad, "Born abroad", "خارج الجمهورية"),
];

impl Governorate {
    /// Look up a two-digit governorate code.
    pub fn from_code(code: &str) -> Option<Governorate> {
        GOVERNORATES
            .iter()
            .find(|(c, _, _, _)| *c == code)
            .map(|(_, g, _, _)| *g)
    }

    pub fn code(&self) -> &'static str {
        self.entry().0
    }

    pub fn english_name(&self) -> &'static str {
        self.entry().2
    }

    pub fn arabic_name(&self) -> &'static str {
        self.entry().3
    }

    pub fn all() -> impl Iterator<Item = Governorate> {
        GOVERNORATES.iter().map(|(_, g, _, _)| *g)
    }

    fn entry(&self) -> &'static (&'static str, Governorate, &'static str, &'static str) {
        // Every variant has exactly one row in the table.
        GOVERNORATES
            .iter()
            .find(|(_, g, _, _)| g == self)
            .unwrap_or(&GOVERNORATES[GOVERNORATES.len() - 1])
    }
}

impl fmt::Display for Governorate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.english_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_has_27_governorates_and_abroad() {
        let all: Vec<Governorate> = Governorate::all().collect();
        assert_eq!(all.len(), 28);
        assert_eq!(
            all.iter().filter(|g| **g != Governorate::BornAbroad).count(),
            27
        );
    }

    #[test]
    fn test_code_round_trip() {
        for governorate in Governorate::all() {
            assert_eq!(Governorate::from_code(governorate.code()), Some(governorate));
        }
    }

    #[test]
    fn test_known_codes() {
        assert_eq!(Governorate::from_code("01"), Some(Governorate::Cairo));
        assert_eq!(Governorate::from_code("21"), Some(Governorate::Giza));
        assert_eq!(Governorate::from_code("88"), Some(Governorate::BornAbroad));
        assert_eq!(Governorate::Dakahlia.arabic_name(), "الدقهلية");
        assert_eq!(Governorate::from_code("05"), None);
        assert_eq!(Governorate::from_code("99"), None);
    }
}
