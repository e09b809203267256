//! Static lookup tables for country and language tags

/// Country full names and their tag codes
pub const COUNTRIES: &[(&str, &str)] = &[
    ("Afghanistan", "AF"),
    ("Albania", "AL"),
    ("Algeria", "DZ"),
    ("Argentina", "AR"),
    ("Armenia", "AM"),
    ("Australia", "AU"),
    ("Austria", "AT"),
    ("Azerbaijan", "AZ"),
    ("Bangladesh", "BD"),
    ("Belarus", "BY"),
    ("Belgium", "BE"),
    ("Bolivia", "BO"),
    ("Bosnia and Herzegovina", "BA"),
    ("Brazil", "BR"),
    ("Bulgaria", "BG"),
    ("Cambodia", "KH"),
    ("Canada", "CA"),
    ("Chile", "CL"),
    ("China", "CN"),
    ("Colombia", "CO"),
    ("Costa Rica", "CR"),
    ("Croatia", "HR"),
    ("Cyprus", "CY"),
    ("Czechia", "CZ"),
    ("Denmark", "DK"),
    ("Dominican Republic", "DO"),
    ("Ecuador", "EC"),
    ("Egypt", "EG"),
    ("Estonia", "EE"),
    ("Finland", "FI"),
    ("France", "FR"),
    ("Georgia", "GE"),
    ("Germany", "DE"),
    ("Ghana", "GH"),
    ("Greece", "GR"),
    ("Guatemala", "GT"),
    ("Hong Kong", "HK"),
    ("Hungary", "HU"),
    ("Iceland", "IS"),
    ("India", "IN"),
    ("Indonesia", "ID"),
    ("Iran", "IR"),
    ("Iraq", "IQ"),
    ("Ireland", "IE"),
    ("Israel", "IL"),
    ("Italy", "IT"),
    ("Japan", "JP"),
    ("Jordan", "JO"),
    ("Kazakhstan", "KZ"),
    ("Kenya", "KE"),
    ("Kuwait", "KW"),
    ("Kyrgyzstan", "KG"),
    ("Latvia", "LV"),
    ("Lebanon", "LB"),
    ("Lithuania", "LT"),
    ("Luxembourg", "LU"),
    ("Malaysia", "MY"),
    ("Malta", "MT"),
    ("Mexico", "MX"),
    ("Moldova", "MD"),
    ("Mongolia", "MN"),
    ("Montenegro", "ME"),
    ("Morocco", "MA"),
    ("Nepal", "NP"),
    ("Netherlands", "NL"),
    ("New Zealand", "NZ"),
    ("Nigeria", "NG"),
    ("North Macedonia", "MK"),
    ("Norway", "NO"),
    ("Pakistan", "PK"),
    ("Panama", "PA"),
    ("Paraguay", "PY"),
    ("Peru", "PE"),
    ("Philippines", "PH"),
    ("Poland", "PL"),
    ("Portugal", "PT"),
    ("Qatar", "QA"),
    ("Romania", "RO"),
    ("Russia", "RU"),
    ("Saudi Arabia", "SA"),
    ("Serbia", "RS"),
    ("Singapore", "SG"),
    ("Slovakia", "SK"),
    ("Slovenia", "SI"),
    ("South Africa", "ZA"),
    ("South Korea", "KR"),
    ("Spain", "ES"),
    ("Sri Lanka", "LK"),
    ("Sweden", "SE"),
    ("Switzerland", "CH"),
    ("Taiwan", "TW"),
    ("Tajikistan", "TJ"),
    ("Thailand", "TH"),
    ("Tunisia", "TN"),
    ("Turkey", "TR"),
    ("Turkmenistan", "TM"),
    ("Ukraine", "UA"),
    ("United Arab Emirates", "AE"),
    ("United Kingdom", "GB"),
    ("United States", "US"),
    ("Uruguay", "UY"),
    ("Uzbekistan", "UZ"),
    ("Venezuela", "VE"),
    ("Vietnam", "VN"),
];

/// Language full names and the detector codes that map onto them
///
/// The first alias is the tag name.
pub const LANGUAGES: &[(&str, &[&str])] = &[
    ("Arabic", &["ara", "ar"]),
    ("Armenian", &["hye", "hy"]),
    ("Azerbaijani", &["aze", "az"]),
    ("Belarusian", &["bel", "be"]),
    ("Bengali", &["ben", "bn"]),
    ("Bulgarian", &["bul", "bg"]),
    ("Catalan", &["cat", "ca"]),
    ("Chinese", &["zho", "cmn", "zh"]),
    ("Croatian", &["hrv", "hr"]),
    ("Czech", &["ces", "cs"]),
    ("Danish", &["dan", "da"]),
    ("Dutch", &["nld", "nl"]),
    ("English", &["eng", "en"]),
    ("Estonian", &["est", "et"]),
    ("Finnish", &["fin", "fi"]),
    ("French", &["fra", "fr"]),
    ("Georgian", &["kat", "ka"]),
    ("German", &["deu", "de"]),
    ("Greek", &["ell", "el"]),
    ("Hebrew", &["heb", "he"]),
    ("Hindi", &["hin", "hi"]),
    ("Hungarian", &["hun", "hu"]),
    ("Indonesian", &["ind", "id"]),
    ("Italian", &["ita", "it"]),
    ("Japanese", &["jpn", "ja"]),
    ("Korean", &["kor", "ko"]),
    ("Latvian", &["lav", "lv"]),
    ("Lithuanian", &["lit", "lt"]),
    ("Macedonian", &["mkd", "mk"]),
    ("Norwegian", &["nor", "nob", "no"]),
    ("Persian", &["fas", "pes", "fa"]),
    ("Polish", &["pol", "pl"]),
    ("Portuguese", &["por", "pt"]),
    ("Romanian", &["ron", "ro"]),
    ("Russian", &["rus", "ru"]),
    ("Serbian", &["srp", "sr"]),
    ("Slovak", &["slk", "sk"]),
    ("Slovenian", &["slv", "sl"]),
    ("Spanish", &["spa", "es"]),
    ("Swedish", &["swe", "sv"]),
    ("Thai", &["tha", "th"]),
    ("Turkish", &["tur", "tr"]),
    ("Ukrainian", &["ukr", "uk"]),
    ("Urdu", &["urd", "ur"]),
    ("Uzbek", &["uzb", "uz"]),
    ("Vietnamese", &["vie", "vi"]),
];

/// Finds the first country whose full name contains `candidate`
///
/// Returns `(code, full_name)`.
pub fn lookup_country(candidate: &str) -> Option<(&'static str, &'static str)> {
    if candidate.is_empty() {
        return None;
    }
    COUNTRIES
        .iter()
        .find(|(full_name, _)| full_name.contains(candidate))
        .map(|(full_name, code)| (*code, *full_name))
}

/// Maps a detector language code onto its canonical tag
///
/// Returns `(name, full_name)`.
pub fn lookup_language(code: &str) -> Option<(&'static str, &'static str)> {
    LANGUAGES
        .iter()
        .find(|(_, aliases)| aliases.contains(&code))
        .map(|(full_name, aliases)| (aliases[0], *full_name))
}
