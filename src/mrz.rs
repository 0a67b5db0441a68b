//! Machine Readable Zone parsing and check digit validation.
//!
//! Layouts follow ICAO Doc 9303 parts 4 (TD3), 5 (TD1) and 7 (MRV-A, MRV-B).

use alloc::{
    format,
    string::{String, ToString},
    vec::Vec,
};
use core::fmt;
use regex::{Captures, Regex};
use std::sync::OnceLock;
use time::{Date, Month};
use tracing::{debug, error};

use crate::error::EmrtdError;

const PASSPORT_PATTERN: &str = "^(P[A-Z0-9<]{1})([A-Z<]{3})([A-Z0-9<]{39})([A-Z0-9<]{9})([0-9<]{1})([A-Z<]{3})([0-9]{6})([0-9]{1})([MF<]{1})([0-9]{6})([0-9]{1})([A-Z0-9<]{14})([0-9<]{1})([0-9<]{1})$";
const ID_CARD_PATTERN: &str = "^([IAC]{1}[A-Z0-9<]{1})([A-Z<]{3})([A-Z0-9<]{9})([0-9<]{1})([A-Z0-9<]{15})([0-9]{6})([0-9]{1})([MF<]{1})([0-9]{6})([0-9]{1})([A-Z<]{3})([A-Z0-9<]{11})([0-9]{1})([A-Z<]{30})$";
const VISA_A_PATTERN: &str = "^(V[A-Z0-9<]{1})([A-Z<]{3})([A-Z0-9<]{39})([A-Z0-9<]{9})([0-9<]{1})([A-Z<]{3})([0-9]{6})([0-9]{1})([MF<]{1})([0-9]{6})([0-9]{1})([A-Z0-9<]{16})$";
const VISA_B_PATTERN: &str = "^(V[A-Z0-9<]{1})([A-Z<]{3})([A-Z0-9<]{31})([A-Z0-9<]{9})([0-9<]{1})([A-Z<]{3})([0-9]{6})([0-9]{1})([MF<]{1})([0-9]{6})([0-9]{1})([A-Z0-9<]{8})$";
const LICENCE_PATTERN: &str = "^(D[A-Z0-9<]{1})([A-Z<]{3})([A-Z0-9<]{25})$";

const MRZ_CHARSET: &str = "0123456789<ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Layout an MRZ was recognised as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MrzFormat {
    /// TD3 passport, 2 lines of 44 characters.
    Passport,
    /// TD1 identity card, 3 lines of 30 characters.
    IdCard,
    /// MRV-A visa, 2 lines of 44 characters.
    VisaA,
    /// MRV-B visa, 2 lines of 36 characters.
    VisaB,
    /// Driving licence, 30 characters.
    DrivingLicence,
}

fn patterns() -> &'static [(MrzFormat, Regex)] {
    static PATTERNS: OnceLock<Vec<(MrzFormat, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (MrzFormat::Passport, PASSPORT_PATTERN),
            (MrzFormat::IdCard, ID_CARD_PATTERN),
            (MrzFormat::VisaA, VISA_A_PATTERN),
            (MrzFormat::VisaB, VISA_B_PATTERN),
            (MrzFormat::DrivingLicence, LICENCE_PATTERN),
        ]
        .into_iter()
        .map(|(format, pattern)| {
            (
                format,
                Regex::new(pattern).expect("MRZ patterns are constant valid expressions"),
            )
        })
        .collect()
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    Male,
    Female,
    Unspecified,
}

impl Sex {
    fn from_mrz(s: &str) -> Self {
        match s {
            "M" => Self::Male,
            "F" => Self::Female,
            _ => Self::Unspecified,
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Male => write!(f, "M"),
            Self::Female => write!(f, "F"),
            Self::Unspecified => write!(f, "<"),
        }
    }
}

/// Calculates the check digit for the given data.
/// Calculation is explained at ICAO Doc 9303-3 Section 4.9:
/// <https://www.icao.int/publications/Documents/9303_p3_cons_en.pdf>
///
/// # Errors
///
/// * `EmrtdError::MrzFormatInvalid` if an invalid character is given.
///
/// # Example
///
/// ```
/// # use emrtd_bac::EmrtdError;
/// #
/// # fn main() -> Result<(), EmrtdError> {
/// use emrtd_bac::mrz::calculate_check_digit;
/// assert_eq!(calculate_check_digit("520727")?, '3');
/// assert_eq!(calculate_check_digit("AB2134<<<")?, '5');
/// #
/// #     Ok(())
/// # }
/// ```
pub fn calculate_check_digit(data: &str) -> Result<char, EmrtdError> {
    let weights = [7, 3, 1];
    let mut total = 0;

    for (counter, value) in data.chars().enumerate() {
        let weighted_value = match value {
            '<' => 0,
            '0'..='9' | 'A'..='Z' => value.to_digit(36).unwrap_or(0),
            _ => {
                error!("Can not calculate check digit for invalid character: `{value}`");
                return Err(EmrtdError::MrzFormatInvalid(format!(
                    "invalid character `{value}`"
                )));
            }
        };
        total += weights[counter % 3] * weighted_value;
    }

    let check_digit =
        char::from_digit(total % 10, 10).expect("u32 % 10 can not be greater than 9");
    Ok(check_digit)
}

/// Checks one field against its check digit.
///
/// Absent fields carry no digit. A field consisting only of fillers may carry
/// `<` or `0` as its digit.
fn verify_check_digit(field: &'static str, value: &str, check: &str) -> Result<(), EmrtdError> {
    if value.is_empty() && check.is_empty() {
        return Ok(());
    }
    let valid = if !value.is_empty() && value.chars().all(|c| c == '<') {
        check == "<" || check == "0"
    } else {
        check.chars().eq(core::iter::once(calculate_check_digit(value)?))
    };
    if !valid {
        error!("MRZ check digit mismatch for {field}");
        return Err(EmrtdError::MrzChecksumMismatch(field));
    }
    Ok(())
}

/// Manually builds the MRZ key used for BAC from the three fields it covers.
///
/// # Errors
///
/// * `EmrtdError::MrzFormatInvalid` if a field length is invalid or it contains invalid characters.
///
/// # Example
///
/// ```
/// # use emrtd_bac::EmrtdError;
/// #
/// # fn main() -> Result<(), EmrtdError> {
/// use emrtd_bac::other_mrz;
/// let result = other_mrz("L898902C3", "740812", "120415")?;
/// assert_eq!(result, String::from("L898902C3674081221204159"));
/// #
/// #     Ok(())
/// # }
/// ```
pub fn other_mrz(doc_no: &str, birthdate: &str, expirydate: &str) -> Result<String, EmrtdError> {
    // Up to 9 characters on TD3 and 22 on TD1 documents
    if doc_no.is_empty() || doc_no.len() > 22 || doc_no.chars().any(|c| !MRZ_CHARSET.contains(c)) {
        error!("Document number must be 1 to 22 MRZ characters, received {doc_no}");
        return Err(EmrtdError::MrzFormatInvalid(format!(
            "invalid document number `{doc_no}`"
        )));
    }
    for (name, date) in [("birth date", birthdate), ("expiry date", expirydate)] {
        if date.len() != 6 || !date.chars().all(|c| c.is_ascii_digit()) {
            error!("The {name} must be 6 digits, received {date}");
            return Err(EmrtdError::MrzFormatInvalid(format!(
                "invalid {name} `{date}`"
            )));
        }
    }

    let doc_no = format!("{doc_no:<<9}");
    Ok(format!(
        "{}{}{}{}{}{}",
        doc_no,
        calculate_check_digit(&doc_no)?,
        birthdate,
        calculate_check_digit(birthdate)?,
        expirydate,
        calculate_check_digit(expirydate)?
    ))
}

/// Picks the four digit year closest to `reference_year` for a two digit `yy`.
fn closest_year(yy: i32, reference_year: i32) -> i32 {
    let century = reference_year.div_euclid(100) * 100;
    [century - 100 + yy, century + yy, century + 100 + yy]
        .into_iter()
        .min_by_key(|year| (year - reference_year).abs())
        .unwrap_or(century + yy)
}

/// Parses a `YYMMDD` MRZ date relative to a reference date.
fn parse_date(yymmdd: &str, reference: Date, not_after_reference: bool) -> Option<Date> {
    if yymmdd.len() != 6 || !yymmdd.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let yy: i32 = yymmdd[0..2].parse().ok()?;
    let mm: u8 = yymmdd[2..4].parse().ok()?;
    let dd: u8 = yymmdd[4..6].parse().ok()?;

    let mut year = closest_year(yy, reference.year());
    if not_after_reference && year > reference.year() {
        year -= 100;
    }
    Date::from_calendar_date(year, Month::try_from(mm).ok()?, dd).ok()
}

fn today() -> Date {
    time::OffsetDateTime::now_utc().date()
}

/// A parsed and validated MRZ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MrzDocument {
    format: MrzFormat,
    document_code: String,
    issuing_state: String,
    primary_identifier: String,
    secondary_identifiers: Vec<String>,
    document_number: String,
    document_number_check: String,
    nationality: String,
    date_of_birth: String,
    date_of_birth_check: String,
    sex: Sex,
    date_of_expiry: String,
    date_of_expiry_check: String,
    personal_number: String,
    personal_number_check: String,
    optional_data_1: String,
    optional_data_2: String,
    composite_check: String,
}

impl MrzDocument {
    /// Parses an MRZ, all lines concatenated. Spaces and line breaks are ignored.
    ///
    /// # Errors
    ///
    /// * `EmrtdError::MrzFormatInvalid` if the text holds characters outside `A-Z0-9<`
    ///   or matches none of the supported layouts.
    /// * `EmrtdError::MrzChecksumMismatch` naming the first field whose check digit is wrong.
    ///
    /// # Example
    ///
    /// ```
    /// # use emrtd_bac::EmrtdError;
    /// #
    /// # fn main() -> Result<(), EmrtdError> {
    /// use emrtd_bac::MrzDocument;
    ///
    /// let mrz = MrzDocument::parse(
    ///     "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<\n\
    ///      L898902C36UTO7408122F1204159ZE184226B<<<<<10",
    /// )?;
    /// assert_eq!(mrz.full_name(), "ERIKSSON, ANNA MARIA");
    /// assert_eq!(mrz.mrz_key().as_deref(), Some("L898902C3674081221204159"));
    /// #
    /// #     Ok(())
    /// # }
    /// ```
    pub fn parse(text: &str) -> Result<Self, EmrtdError> {
        let mrz: String = text.chars().filter(|c| !c.is_whitespace()).collect();

        if let Some(c) = mrz.chars().find(|&c| !MRZ_CHARSET.contains(c)) {
            error!("MRZ contains invalid character `{c}`");
            return Err(EmrtdError::MrzFormatInvalid(format!(
                "invalid character `{c}`"
            )));
        }

        let Some((format, caps)) = patterns()
            .iter()
            .find_map(|(format, regex)| regex.captures(&mrz).map(|caps| (*format, caps)))
        else {
            error!("MRZ of length {} matches no known layout", mrz.len());
            return Err(EmrtdError::MrzFormatInvalid(format!(
                "unrecognised layout of length {}",
                mrz.len()
            )));
        };
        debug!("MRZ recognised as {format:?}");

        let document = Self::from_captures(format, &caps);
        document.validate()?;
        Ok(document)
    }

    fn from_captures(format: MrzFormat, caps: &Captures) -> Self {
        let group = |i: usize| caps.get(i).map_or("", |m| m.as_str()).to_string();

        let mut document = Self {
            format,
            document_code: group(1),
            issuing_state: group(2),
            primary_identifier: String::new(),
            secondary_identifiers: Vec::new(),
            document_number: String::new(),
            document_number_check: String::new(),
            nationality: String::new(),
            date_of_birth: String::new(),
            date_of_birth_check: String::new(),
            sex: Sex::Unspecified,
            date_of_expiry: String::new(),
            date_of_expiry_check: String::new(),
            personal_number: String::new(),
            personal_number_check: String::new(),
            optional_data_1: String::new(),
            optional_data_2: String::new(),
            composite_check: String::new(),
        };

        let names = match format {
            MrzFormat::Passport | MrzFormat::VisaA | MrzFormat::VisaB => {
                document.document_number = group(4);
                document.document_number_check = group(5);
                document.nationality = group(6);
                document.date_of_birth = group(7);
                document.date_of_birth_check = group(8);
                document.sex = Sex::from_mrz(&group(9));
                document.date_of_expiry = group(10);
                document.date_of_expiry_check = group(11);
                if format == MrzFormat::Passport {
                    document.personal_number = group(12);
                    document.personal_number_check = group(13);
                    document.composite_check = group(14);
                } else {
                    document.optional_data_1 = group(12);
                }
                group(3)
            }
            MrzFormat::IdCard => {
                document.document_number = group(3);
                document.document_number_check = group(4);
                document.optional_data_1 = group(5);
                document.date_of_birth = group(6);
                document.date_of_birth_check = group(7);
                document.sex = Sex::from_mrz(&group(8));
                document.date_of_expiry = group(9);
                document.date_of_expiry_check = group(10);
                document.nationality = group(11);
                document.optional_data_2 = group(12);
                document.composite_check = group(13);
                group(14)
            }
            MrzFormat::DrivingLicence => String::new(),
        };

        let (primary, secondary) = split_names(&names);
        document.primary_identifier = primary;
        document.secondary_identifiers = secondary;
        document
    }

    fn validate(&self) -> Result<(), EmrtdError> {
        verify_check_digit(
            "document number",
            &self.document_number,
            &self.document_number_check,
        )?;
        verify_check_digit(
            "date of birth",
            &self.date_of_birth,
            &self.date_of_birth_check,
        )?;
        verify_check_digit(
            "date of expiry",
            &self.date_of_expiry,
            &self.date_of_expiry_check,
        )?;
        verify_check_digit(
            "personal number",
            &self.personal_number,
            &self.personal_number_check,
        )?;

        if !self.composite_check.is_empty() {
            let composite = format!(
                "{}{}{}{}{}{}{}{}{}{}",
                self.document_number,
                self.document_number_check,
                self.optional_data_1,
                self.date_of_birth,
                self.date_of_birth_check,
                self.date_of_expiry,
                self.date_of_expiry_check,
                self.personal_number,
                self.personal_number_check,
                self.optional_data_2
            );
            verify_check_digit("composite", &composite, &self.composite_check)?;
        }
        Ok(())
    }

    #[must_use]
    pub const fn format(&self) -> MrzFormat {
        self.format
    }

    /// Document code without fillers, e.g. `P` or `ID`.
    #[must_use]
    pub fn document_code(&self) -> String {
        self.document_code.replace('<', "")
    }

    #[must_use]
    pub fn issuing_state(&self) -> &str {
        &self.issuing_state
    }

    /// Document number without trailing fillers.
    #[must_use]
    pub fn document_number(&self) -> &str {
        self.document_number.trim_end_matches('<')
    }

    #[must_use]
    pub fn nationality(&self) -> &str {
        &self.nationality
    }

    #[must_use]
    pub const fn sex(&self) -> Sex {
        self.sex
    }

    /// Personal number (TD3) without trailing fillers.
    #[must_use]
    pub fn personal_number(&self) -> &str {
        self.personal_number.trim_end_matches('<')
    }

    /// Optional data of TD1 line 1 or of a visa, without trailing fillers.
    #[must_use]
    pub fn optional_data(&self) -> &str {
        self.optional_data_1.trim_end_matches('<')
    }

    /// Surname(s), inner fillers replaced by spaces.
    #[must_use]
    pub fn primary_identifier(&self) -> &str {
        &self.primary_identifier
    }

    /// Given names.
    #[must_use]
    pub fn secondary_identifiers(&self) -> &[String] {
        &self.secondary_identifiers
    }

    /// `PRIMARY, SECONDARY NAMES`
    #[must_use]
    pub fn full_name(&self) -> String {
        format!(
            "{}, {}",
            self.primary_identifier,
            self.secondary_identifiers.join(" ")
        )
    }

    /// The MRZ key for BAC: document number, birth date and expiry date, each
    /// followed by its check digit. Only passports carry one.
    #[must_use]
    pub fn mrz_key(&self) -> Option<String> {
        if self.format != MrzFormat::Passport {
            return None;
        }
        Some(format!(
            "{}{}{}{}{}{}",
            self.document_number,
            self.document_number_check,
            self.date_of_birth,
            self.date_of_birth_check,
            self.date_of_expiry,
            self.date_of_expiry_check
        ))
    }

    /// Date of birth, never later than today.
    #[must_use]
    pub fn date_of_birth(&self) -> Option<Date> {
        self.date_of_birth_at(today())
    }

    /// Date of birth relative to `reference`, never later than it.
    #[must_use]
    pub fn date_of_birth_at(&self, reference: Date) -> Option<Date> {
        parse_date(&self.date_of_birth, reference, true)
    }

    /// Expiry date, in the century closest to today.
    #[must_use]
    pub fn expiry_date(&self) -> Option<Date> {
        self.expiry_date_at(today())
    }

    /// Expiry date, in the century closest to `reference`.
    #[must_use]
    pub fn expiry_date_at(&self, reference: Date) -> Option<Date> {
        parse_date(&self.date_of_expiry, reference, false)
    }

    /// Whether the document expired before `today`; `None` without an expiry date.
    #[must_use]
    pub fn is_expired(&self, today: Date) -> Option<bool> {
        self.expiry_date_at(today).map(|expiry| expiry < today)
    }
}

impl fmt::Display for MrzDocument {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut lines = Vec::new();
        let code = self.document_code();
        if !code.is_empty() {
            lines.push(format!("Document Type: {code}"));
        }
        let number = self.document_number.replace('<', "");
        if !number.is_empty() {
            lines.push(format!("Document Number: {number}"));
        }
        if !self.secondary_identifiers.is_empty() {
            lines.push(format!(
                "Given Names: {}",
                self.secondary_identifiers.join(" ")
            ));
        }
        if !self.primary_identifier.is_empty() {
            lines.push(format!("Last Name: {}", self.primary_identifier));
        }
        if self.format != MrzFormat::DrivingLicence {
            lines.push(format!("Sex: {}", self.sex));
        }
        if !self.date_of_birth.is_empty() {
            lines.push(format!("Date of Birth: {}", self.date_of_birth));
        }
        if !self.date_of_expiry.is_empty() {
            lines.push(format!("Expiry Date: {}", self.date_of_expiry));
        }
        write!(f, "{}", lines.join("\n"))
    }
}

/// Splits an MRZ name field into the primary identifier and the given names.
pub(crate) fn split_names(field: &str) -> (String, Vec<String>) {
    let field = field.trim_end_matches('<');
    let (primary, secondary) = field.split_once("<<").unwrap_or((field, ""));
    (
        primary
            .split('<')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
        secondary
            .split('<')
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect(),
    )
}
