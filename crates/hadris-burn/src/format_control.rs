//! Data Cache / Format Control (Component J): the `-blank`/`-format` state
//! machine, per profile.

use crate::backend::DiscProfile;
use crate::error::PolicyError;

/// Current format state of the medium.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatState {
    Unformatted,
    Formatted,
}

/// What the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatRequest {
    Blank { fast: bool },
    Format,
    NoAction,
}

/// What the engine should actually do, possibly different from the
/// request after per-profile policy is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatAction {
    AutoFormatDefaultSize,
    Blank { fast: bool },
    Format,
    /// `-blank` on already-blank media without deformat: "no action".
    NoAction,
    /// A full format of DVD-RW sequential leaves a certification pattern
    /// that must be zeroed with an unconditional quick blank.
    FormatThenQuickBlank,
}

pub fn plan_format(
    profile: DiscProfile,
    requested: FormatRequest,
    current_state: FormatState,
    erasable: bool,
) -> Result<FormatAction, PolicyError> {
    match profile {
        DiscProfile::DVD_PLUS_RAM | DiscProfile::BD_RE => {
            if current_state == FormatState::Unformatted {
                return Ok(FormatAction::AutoFormatDefaultSize);
            }
            Ok(match requested {
                FormatRequest::NoAction => FormatAction::NoAction,
                FormatRequest::Blank { fast } => FormatAction::Blank { fast },
                FormatRequest::Format => FormatAction::Format,
            })
        }
        DiscProfile::DVD_RW_SEQUENTIAL => match requested {
            // Fast-blank on formatted media converts to a full blank, and
            // vice versa, on this profile.
            FormatRequest::Blank { fast: true } if current_state == FormatState::Formatted => {
                Ok(FormatAction::Blank { fast: false })
            }
            FormatRequest::Blank { fast: false } if current_state == FormatState::Unformatted => {
                Ok(FormatAction::Blank { fast: true })
            }
            FormatRequest::Blank { fast } => Ok(FormatAction::Blank { fast }),
            FormatRequest::Format => Ok(FormatAction::FormatThenQuickBlank),
            FormatRequest::NoAction => Ok(FormatAction::NoAction),
        },
        DiscProfile::DVD_RW_RESTRICTED_OVERWRITE => match requested {
            FormatRequest::Blank { fast: true } => Err(PolicyError::NotErasable),
            FormatRequest::Blank { fast: false } => Ok(FormatAction::Blank { fast: false }),
            FormatRequest::Format => Ok(FormatAction::Format),
            FormatRequest::NoAction => Ok(FormatAction::NoAction),
        },
        DiscProfile::DVD_PLUS_RW => match requested {
            FormatRequest::Blank { fast: true } => Ok(FormatAction::NoAction),
            FormatRequest::Blank { fast: false } => Ok(FormatAction::Blank { fast: false }),
            FormatRequest::Format => Ok(FormatAction::Format),
            FormatRequest::NoAction => Ok(FormatAction::NoAction),
        },
        DiscProfile::BD_R_SRM => {
            if current_state == FormatState::Unformatted {
                return Ok(FormatAction::AutoFormatDefaultSize);
            }
            Ok(match requested {
                FormatRequest::NoAction => FormatAction::NoAction,
                FormatRequest::Blank { fast } => FormatAction::Blank { fast },
                FormatRequest::Format => FormatAction::Format,
            })
        }
        profile if profile.is_cd() => {
            if !erasable {
                return match requested {
                    FormatRequest::Blank { .. } => Err(PolicyError::NotErasable),
                    FormatRequest::Format => Err(PolicyError::NotErasable),
                    FormatRequest::NoAction => Ok(FormatAction::NoAction),
                };
            }
            Ok(match requested {
                FormatRequest::NoAction => FormatAction::NoAction,
                FormatRequest::Blank { fast } => FormatAction::Blank { fast },
                FormatRequest::Format => FormatAction::Format,
            })
        }
        _ => Ok(match requested {
            FormatRequest::NoAction => FormatAction::NoAction,
            FormatRequest::Blank { fast } => FormatAction::Blank { fast },
            FormatRequest::Format => FormatAction::Format,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dvd_plus_ram_auto_formats_when_unformatted() {
        let action = plan_format(
            DiscProfile::DVD_PLUS_RAM,
            FormatRequest::NoAction,
            FormatState::Unformatted,
            false,
        )
        .unwrap();
        assert_eq!(action, FormatAction::AutoFormatDefaultSize);
    }

    #[test]
    fn dvd_rw_sequential_converts_fast_blank_to_full_on_formatted() {
        let action = plan_format(
            DiscProfile::DVD_RW_SEQUENTIAL,
            FormatRequest::Blank { fast: true },
            FormatState::Formatted,
            false,
        )
        .unwrap();
        assert_eq!(action, FormatAction::Blank { fast: false });
    }

    #[test]
    fn dvd_rw_restricted_overwrite_rejects_fast_blank() {
        let err = plan_format(
            DiscProfile::DVD_RW_RESTRICTED_OVERWRITE,
            FormatRequest::Blank { fast: true },
            FormatState::Formatted,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::NotErasable));
    }

    #[test]
    fn dvd_plus_rw_fast_blank_is_noop() {
        let action = plan_format(
            DiscProfile::DVD_PLUS_RW,
            FormatRequest::Blank { fast: true },
            FormatState::Formatted,
            false,
        )
        .unwrap();
        assert_eq!(action, FormatAction::NoAction);
    }

    #[test]
    fn bd_r_srm_auto_formats_when_unformatted() {
        let action = plan_format(
            DiscProfile::BD_R_SRM,
            FormatRequest::NoAction,
            FormatState::Unformatted,
            false,
        )
        .unwrap();
        assert_eq!(action, FormatAction::AutoFormatDefaultSize);
    }

    #[test]
    fn cd_rw_blank_rejected_when_not_erasable() {
        let err = plan_format(
            DiscProfile::CD_RW,
            FormatRequest::Blank { fast: true },
            FormatState::Formatted,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, PolicyError::NotErasable));
    }

    #[test]
    fn blank_on_already_blank_medium_returns_no_action() {
        let action = plan_format(
            DiscProfile::CD_RW,
            FormatRequest::NoAction,
            FormatState::Unformatted,
            true,
        )
        .unwrap();
        assert_eq!(action, FormatAction::NoAction);
    }

    #[test]
    fn dvd_rw_sequential_full_format_requires_quick_blank_followup() {
        let action = plan_format(
            DiscProfile::DVD_RW_SEQUENTIAL,
            FormatRequest::Format,
            FormatState::Formatted,
            false,
        )
        .unwrap();
        assert_eq!(action, FormatAction::FormatThenQuickBlank);
    }
}
