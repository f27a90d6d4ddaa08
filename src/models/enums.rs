use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + label + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal : $label:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }

            /// Human-readable label shown to clients
            pub fn label(&self) -> &'static str {
                match self {
                    $(Self::$variant => $label),+
                }
            }

            pub const ALL: &'static [$name] = &[$($name::$variant),+];
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(Role {
    Admin => "admin" : "Administrator",
    Doctor => "doctor" : "Dokter",
    Nurse => "nurse" : "Perawat",
    Staff => "staff" : "Staff",
});

str_enum!(Gender {
    Male => "L" : "Laki-laki",
    Female => "P" : "Perempuan",
});

str_enum!(BloodType {
    A => "A" : "A",
    B => "B" : "B",
    Ab => "AB" : "AB",
    O => "O" : "O",
    APositive => "A+" : "A+",
    ANegative => "A-" : "A-",
    BPositive => "B+" : "B+",
    BNegative => "B-" : "B-",
    AbPositive => "AB+" : "AB+",
    AbNegative => "AB-" : "AB-",
    OPositive => "O+" : "O+",
    ONegative => "O-" : "O-",
});

str_enum!(IdentityType {
    Ktp => "ktp" : "KTP",
    Sim => "sim" : "SIM",
    Passport => "passport" : "Passport",
    FamilyCard => "kk" : "Kartu Keluarga",
    BirthCertificate => "anak" : "Akta Kelahiran",
});

str_enum!(MaritalStatus {
    Single => "belum_menikah" : "Belum Menikah",
    Married => "menikah" : "Menikah",
    Divorced => "cerai" : "Cerai",
    Widowed => "janda" : "Janda/Duda",
});

str_enum!(Religion {
    Islam => "islam" : "Islam",
    Kristen => "kristen" : "Kristen",
    Katolik => "katolik" : "Katolik",
    Hindu => "hindu" : "Hindu",
    Buddha => "buddha" : "Buddha",
    Konghucu => "konghucu" : "Konghucu",
    Lainnya => "lainnya" : "Lainnya",
});

str_enum!(PatientStatus {
    Active => "aktif" : "Aktif",
    Inactive => "tidak_aktif" : "Tidak Aktif",
    Deceased => "meninggal" : "Meninggal",
});

str_enum!(TokenKind {
    Auth => "auth" : "Auth",
    Refresh => "refresh" : "Refresh",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn role_round_trip() {
        for (variant, s) in [
            (Role::Admin, "admin"),
            (Role::Doctor, "doctor"),
            (Role::Nurse, "nurse"),
            (Role::Staff, "staff"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(Role::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn role_labels() {
        assert_eq!(Role::Admin.label(), "Administrator");
        assert_eq!(Role::Doctor.label(), "Dokter");
        assert_eq!(Role::Nurse.label(), "Perawat");
    }

    #[test]
    fn gender_round_trip() {
        assert_eq!(Gender::Male.as_str(), "L");
        assert_eq!(Gender::Female.as_str(), "P");
        assert_eq!(Gender::from_str("L").unwrap(), Gender::Male);
        assert_eq!(Gender::Male.label(), "Laki-laki");
    }

    #[test]
    fn blood_type_covers_twelve_values() {
        assert_eq!(BloodType::ALL.len(), 12);
        for variant in BloodType::ALL {
            assert_eq!(BloodType::from_str(variant.as_str()).unwrap(), *variant);
        }
    }

    #[test]
    fn patient_status_round_trip() {
        for (variant, s) in [
            (PatientStatus::Active, "aktif"),
            (PatientStatus::Inactive, "tidak_aktif"),
            (PatientStatus::Deceased, "meninggal"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(PatientStatus::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn identity_type_labels() {
        assert_eq!(IdentityType::FamilyCard.label(), "Kartu Keluarga");
        assert_eq!(IdentityType::BirthCertificate.label(), "Akta Kelahiran");
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(Role::from_str("superuser").is_err());
        assert!(Gender::from_str("X").is_err());
        assert!(PatientStatus::from_str("").is_err());
        assert!(BloodType::from_str("C").is_err());
    }
}
