//! MySQL column types as they appear in table map events

use crate::error::DecodeError;

/// Column type codes from the binlog table map event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ColumnType {
    Decimal = 0,
    Tiny = 1,
    Short = 2,
    Long = 3,
    Float = 4,
    Double = 5,
    Null = 6,
    Timestamp = 7,
    LongLong = 8,
    Int24 = 9,
    Date = 10,
    Time = 11,
    DateTime = 12,
    Year = 13,
    NewDate = 14,
    Varchar = 15,
    Bit = 16,
    Timestamp2 = 17,
    DateTime2 = 18,
    Time2 = 19,
    NewDecimal = 246,
    Enum = 247,
    Set = 248,
    TinyBlob = 249,
    MediumBlob = 250,
    LongBlob = 251,
    Blob = 252,
    VarString = 253,
    String = 254,
    Geometry = 255,
}

impl ColumnType {
    pub fn from_u8(value: u8) -> Result<Self, DecodeError> {
        Ok(match value {
            0 => ColumnType::Decimal,
            1 => ColumnType::Tiny,
            2 => ColumnType::Short,
            3 => ColumnType::Long,
            4 => ColumnType::Float,
            5 => ColumnType::Double,
            6 => ColumnType::Null,
            7 => ColumnType::Timestamp,
            8 => ColumnType::LongLong,
            9 => ColumnType::Int24,
            10 => ColumnType::Date,
            11 => ColumnType::Time,
            12 => ColumnType::DateTime,
            13 => ColumnType::Year,
            14 => ColumnType::NewDate,
            15 => ColumnType::Varchar,
            16 => ColumnType::Bit,
            17 => ColumnType::Timestamp2,
            18 => ColumnType::DateTime2,
            19 => ColumnType::Time2,
            246 => ColumnType::NewDecimal,
            247 => ColumnType::Enum,
            248 => ColumnType::Set,
            249 => ColumnType::TinyBlob,
            250 => ColumnType::MediumBlob,
            251 => ColumnType::LongBlob,
            252 => ColumnType::Blob,
            253 => ColumnType::VarString,
            254 => ColumnType::String,
            255 => ColumnType::Geometry,
            other => return Err(DecodeError::UnknownColumnType(other)),
        })
    }

    /// Bytes this type occupies in the table map metadata blob.
    pub fn metadata_len(&self) -> usize {
        match self {
            ColumnType::Varchar
            | ColumnType::VarString
            | ColumnType::String
            | ColumnType::Enum
            | ColumnType::Set
            | ColumnType::Decimal
            | ColumnType::NewDecimal
            | ColumnType::Bit => 2,
            ColumnType::Float
            | ColumnType::Double
            | ColumnType::TinyBlob
            | ColumnType::MediumBlob
            | ColumnType::LongBlob
            | ColumnType::Blob
            | ColumnType::Geometry
            | ColumnType::Timestamp2
            | ColumnType::DateTime2
            | ColumnType::Time2 => 1,
            _ => 0,
        }
    }

    /// The non-null half of the Avro union this column maps to.
    pub fn avro_type(&self) -> &'static str {
        match self {
            ColumnType::Tiny
            | ColumnType::Short
            | ColumnType::Int24
            | ColumnType::Long
            | ColumnType::Year => "int",
            ColumnType::LongLong | ColumnType::Bit => "long",
            ColumnType::Float => "float",
            ColumnType::Double => "double",
            ColumnType::TinyBlob
            | ColumnType::MediumBlob
            | ColumnType::LongBlob
            | ColumnType::Blob
            | ColumnType::Geometry => "bytes",
            _ => "string",
        }
    }

    pub fn is_blob(&self) -> bool {
        matches!(
            self,
            ColumnType::TinyBlob | ColumnType::MediumBlob | ColumnType::LongBlob | ColumnType::Blob
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_u8_round_trip() {
        for code in [0u8, 1, 3, 8, 15, 16, 17, 18, 19, 246, 252, 254, 255] {
            let ct = ColumnType::from_u8(code).unwrap();
            assert_eq!(ct as u8, code);
        }
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        assert!(matches!(
            ColumnType::from_u8(0x99),
            Err(DecodeError::UnknownColumnType(0x99))
        ));
    }

    #[test]
    fn test_metadata_lengths() {
        assert_eq!(ColumnType::Varchar.metadata_len(), 2);
        assert_eq!(ColumnType::String.metadata_len(), 2);
        assert_eq!(ColumnType::Bit.metadata_len(), 2);
        assert_eq!(ColumnType::Blob.metadata_len(), 1);
        assert_eq!(ColumnType::DateTime2.metadata_len(), 1);
        assert_eq!(ColumnType::Long.metadata_len(), 0);
        assert_eq!(ColumnType::Date.metadata_len(), 0);
    }

    #[test]
    fn test_avro_type_mapping() {
        assert_eq!(ColumnType::Long.avro_type(), "int");
        assert_eq!(ColumnType::LongLong.avro_type(), "long");
        assert_eq!(ColumnType::Float.avro_type(), "float");
        assert_eq!(ColumnType::Double.avro_type(), "double");
        assert_eq!(ColumnType::Varchar.avro_type(), "string");
        assert_eq!(ColumnType::DateTime2.avro_type(), "string");
        assert_eq!(ColumnType::Blob.avro_type(), "bytes");
        assert_eq!(ColumnType::Bit.avro_type(), "long");
    }
}
