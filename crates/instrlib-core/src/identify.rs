//! Identify profiles for every supported instrument family.
//!
//! A profile carries everything the discovery sweep needs to ask a port
//! "who are you?" at a family's link settings: the identify frame, the
//! terminator to read up to, and the signature the reply must start with.
//!
//! Classification compares a fixed-length prefix of the decoded reply with
//! each family's signature in [`InstrumentFamily::ALL`] order; the first
//! match wins.

use std::time::Duration;

use crate::types::{InstrumentFamily, LinkSettings, Terminator};

/// How to identify one instrument family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifyProfile {
    /// The family this profile identifies.
    pub family: InstrumentFamily,
    /// Link settings used for the transient probe connection and, by
    /// default, for the long-lived channel.
    pub link: LinkSettings,
    /// Raw identify frame, terminators included.
    pub identify_frame: &'static [u8],
    /// Reply terminator.
    pub terminator: Terminator,
    /// Prefix the decoded identify reply must start with.
    pub signature: &'static str,
}

const FLUKE_8846: IdentifyProfile = IdentifyProfile {
    family: InstrumentFamily::Fluke8846,
    link: LinkSettings {
        baud_rate: 57_600,
        timeout: Duration::from_secs(1),
    },
    identify_frame: b"\r*idn?\r",
    terminator: Terminator::Cr,
    signature: "FLUKE,8846A",
};

const FLUKE_2700: IdentifyProfile = IdentifyProfile {
    family: InstrumentFamily::Fluke2700,
    link: LinkSettings {
        baud_rate: 9_600,
        timeout: Duration::from_millis(300),
    },
    identify_frame: b"\r*idn?\r",
    terminator: Terminator::Cr,
    signature: "FLUKE,2700G",
};

const PACE_1000: IdentifyProfile = IdentifyProfile {
    family: InstrumentFamily::Pace1000,
    link: LinkSettings {
        baud_rate: 57_600,
        timeout: Duration::from_secs(4),
    },
    identify_frame: b"\r\n*idn?\r\n",
    terminator: Terminator::CrLf,
    signature: "*IDN GE Druck,PACE1000",
};

const CORDIS: IdentifyProfile = IdentifyProfile {
    family: InstrumentFamily::Cordis,
    link: LinkSettings {
        baud_rate: 57_600,
        timeout: Duration::from_millis(400),
    },
    identify_frame: b"?ID\r",
    terminator: Terminator::Cr,
    signature: "ID",
};

const SUREFLOW: IdentifyProfile = IdentifyProfile {
    family: InstrumentFamily::SureFlow,
    link: LinkSettings {
        baud_rate: 19_200,
        timeout: Duration::from_millis(200),
    },
    identify_frame: b"\r*\r",
    terminator: Terminator::Cr,
    signature: "A ",
};

/// The identify profile for `family`.
pub fn profile(family: InstrumentFamily) -> &'static IdentifyProfile {
    match family {
        InstrumentFamily::Fluke8846 => &FLUKE_8846,
        InstrumentFamily::Fluke2700 => &FLUKE_2700,
        InstrumentFamily::Pace1000 => &PACE_1000,
        InstrumentFamily::Cordis => &CORDIS,
        InstrumentFamily::SureFlow => &SUREFLOW,
    }
}

impl IdentifyProfile {
    /// Whether a decoded identify reply carries this profile's signature.
    pub fn matches(&self, response: &str) -> bool {
        response.as_bytes().get(..self.signature.len()) == Some(self.signature.as_bytes())
    }
}

/// Classify a decoded identify reply against every known signature in
/// priority order.
///
/// Returns the first family whose signature prefixes `response`, or `None`.
pub fn classify_response(response: &str) -> Option<InstrumentFamily> {
    InstrumentFamily::ALL
        .iter()
        .copied()
        .find(|family| profile(*family).matches(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_REPLIES: [(InstrumentFamily, &str); 5] = [
        (InstrumentFamily::Fluke8846, "FLUKE,8846A,1234567,08/02/10-11:53"),
        (InstrumentFamily::Fluke2700, "FLUKE,2700G,9876543,1.04"),
        (InstrumentFamily::Pace1000, "*IDN GE Druck,PACE1000,1234567,02.00.05"),
        (InstrumentFamily::Cordis, "ID CS-5090 rev2"),
        (InstrumentFamily::SureFlow, "A +014.70 +022.1 +000.00 +000.00"),
    ];

    #[test]
    fn every_reply_classifies_as_its_own_family() {
        for (family, reply) in SAMPLE_REPLIES {
            assert_eq!(classify_response(reply), Some(family), "{reply}");
        }
    }

    #[test]
    fn each_profile_rejects_other_families() {
        for (family, _) in SAMPLE_REPLIES {
            let p = profile(family);
            for (other, reply) in SAMPLE_REPLIES {
                assert_eq!(p.matches(reply), family == other, "{family} vs {reply}");
            }
        }
    }

    #[test]
    fn short_or_garbage_replies_do_not_classify() {
        assert_eq!(classify_response(""), None);
        assert_eq!(classify_response("I"), None);
        assert_eq!(classify_response("FLUKE,88"), None);
        assert_eq!(classify_response("garbage"), None);
    }

    #[test]
    fn profile_link_settings() {
        assert_eq!(profile(InstrumentFamily::Cordis).link.baud_rate, 57_600);
        assert_eq!(
            profile(InstrumentFamily::Cordis).link.timeout,
            Duration::from_millis(400)
        );
        assert_eq!(profile(InstrumentFamily::Fluke2700).link.baud_rate, 9_600);
        assert_eq!(profile(InstrumentFamily::SureFlow).link.baud_rate, 19_200);
        assert_eq!(
            profile(InstrumentFamily::Pace1000).terminator,
            Terminator::CrLf
        );
    }

    #[test]
    fn profile_family_round_trip() {
        for family in InstrumentFamily::ALL {
            assert_eq!(profile(family).family, family);
        }
    }
}
