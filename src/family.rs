//! Item model registry.
//!
//! Maps user-facing itemtype tags onto the closed set of model families and
//! holds the per-family category-count rule. Parameter packing lives in
//! [`crate::item`], the response functions in [`crate::trace`].

use std::fmt;

use crate::error::{SimError, SimResult};

/// Operational function of an ordered unfolding (Luo 2001) item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnfoldingLink {
    /// Squared simple logistic: `psi(x) = exp(x^2)`.
    Sslm,
    /// Hyperbolic cosine: `psi(x) = cosh(x)`.
    Hcm,
    /// Parallelogram: `psi(x) = x^2`.
    Paralla,
    /// Absolute logistic: `psi(x) = exp(|x|)`.
    Alm,
}

impl UnfoldingLink {
    fn from_subtag(tag: &str) -> Option<Self> {
        match tag {
            "sslm" => Some(Self::Sslm),
            "hcm" => Some(Self::Hcm),
            "paralla" => Some(Self::Paralla),
            "alm" => Some(Self::Alm),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Sslm => "sslm",
            Self::Hcm => "hcm",
            Self::Paralla => "paralla",
            Self::Alm => "alm",
        }
    }

    /// `ln psi(x)`.
    #[inline]
    pub fn log_psi(self, x: f64) -> f64 {
        match self {
            Self::Sslm => x * x,
            Self::Hcm => crate::utils::log_cosh(x),
            Self::Paralla => 2.0 * x.abs().ln(),
            Self::Alm => x.abs(),
        }
    }
}

/// Closed set of supported item response families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemFamily {
    Dichotomous,
    Graded,
    Gpcm,
    Nominal,
    NestedLogit,
    PartComp,
    Ideal,
    Lca,
    Ggum,
    Unfolding(UnfoldingLink),
}

const LUO_PREFIX: &str = "Luo2001_";

impl ItemFamily {
    /// Resolve an itemtype tag.
    ///
    /// Rating-scale tags and the unqualified `Rasch` tag are rejected with the
    /// name of the family to use instead.
    pub fn from_tag(tag: &str) -> SimResult<Self> {
        let family = match tag {
            "dich" | "2PL" | "3PL" | "3PLu" | "4PL" => Self::Dichotomous,
            "graded" | "grm" => Self::Graded,
            "gpcm" => Self::Gpcm,
            "nominal" => Self::Nominal,
            "nestlogit" | "2PLNRM" | "3PLNRM" | "3PLuNRM" | "4PLNRM" => Self::NestedLogit,
            "partcomp" | "PC2PL" | "PC3PL" => Self::PartComp,
            "ideal" => Self::Ideal,
            "lca" => Self::Lca,
            "ggum" => Self::Ggum,
            "Rasch" => {
                return Err(SimError::DeprecatedItemType {
                    tag: tag.to_string(),
                    replacement: "gpcm (or 2PL with fixed unit slopes)",
                })
            }
            "grsm" | "grsmIRT" => {
                return Err(SimError::DeprecatedItemType {
                    tag: tag.to_string(),
                    replacement: "graded",
                })
            }
            "rsm" => {
                return Err(SimError::DeprecatedItemType {
                    tag: tag.to_string(),
                    replacement: "gpcm",
                })
            }
            other => {
                let sub = other.strip_prefix(LUO_PREFIX).unwrap_or(other);
                match UnfoldingLink::from_subtag(sub) {
                    Some(link) => Self::Unfolding(link),
                    None => return Err(SimError::UnknownItemType(other.to_string())),
                }
            }
        };
        Ok(family)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Dichotomous => "dich",
            Self::Graded => "graded",
            Self::Gpcm => "gpcm",
            Self::Nominal => "nominal",
            Self::NestedLogit => "nestlogit",
            Self::PartComp => "partcomp",
            Self::Ideal => "ideal",
            Self::Lca => "lca",
            Self::Ggum => "ggum",
            Self::Unfolding(link) => link.name(),
        }
    }

    /// Whether guessing/upper asymptotes survive on polytomous items.
    pub fn keeps_asymptotes_when_polytomous(self) -> bool {
        matches!(self, Self::NestedLogit)
    }

    /// Number of response categories implied by the non-missing entry counts
    /// of an item's input rows.
    ///
    /// `intercepts` counts the intercept row; `auxiliary` is the t-row count
    /// for ggum, the rho-row count for unfolding items and the supplied
    /// category count for lca. Families that ignore the auxiliary count accept
    /// `None`.
    pub fn category_count(self, intercepts: usize, auxiliary: Option<usize>) -> usize {
        match self {
            Self::Gpcm | Self::Nominal | Self::NestedLogit => intercepts,
            Self::PartComp | Self::Ideal => 2,
            Self::Lca => auxiliary.unwrap_or(2),
            Self::Ggum | Self::Unfolding(_) => auxiliary.unwrap_or(0) + 1,
            Self::Dichotomous | Self::Graded => intercepts + 1,
        }
    }
}

impl fmt::Display for ItemFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logistic_aliases_resolve_to_dichotomous() {
        for tag in ["dich", "2PL", "3PL", "3PLu", "4PL"] {
            assert_eq!(ItemFamily::from_tag(tag).unwrap(), ItemFamily::Dichotomous);
        }
    }

    #[test]
    fn unfolding_subtag_is_stripped() {
        assert_eq!(
            ItemFamily::from_tag("Luo2001_sslm").unwrap(),
            ItemFamily::Unfolding(UnfoldingLink::Sslm)
        );
        assert_eq!(
            ItemFamily::from_tag("hcm").unwrap(),
            ItemFamily::Unfolding(UnfoldingLink::Hcm)
        );
        assert!(matches!(
            ItemFamily::from_tag("Luo2001_bogus"),
            Err(SimError::UnknownItemType(_))
        ));
    }

    #[test]
    fn ambiguous_tags_are_rejected() {
        for tag in ["Rasch", "grsm", "grsmIRT", "rsm"] {
            assert!(matches!(
                ItemFamily::from_tag(tag),
                Err(SimError::DeprecatedItemType { .. })
            ));
        }
    }

    #[test]
    fn category_count_rules() {
        assert_eq!(ItemFamily::Dichotomous.category_count(1, None), 2);
        assert_eq!(ItemFamily::Graded.category_count(3, None), 4);
        assert_eq!(ItemFamily::Gpcm.category_count(4, None), 4);
        assert_eq!(ItemFamily::Nominal.category_count(3, None), 3);
        assert_eq!(ItemFamily::NestedLogit.category_count(4, None), 4);
        assert_eq!(ItemFamily::PartComp.category_count(2, None), 2);
        assert_eq!(ItemFamily::Ideal.category_count(1, None), 2);
        assert_eq!(ItemFamily::Lca.category_count(0, None), 2);
        assert_eq!(ItemFamily::Lca.category_count(0, Some(3)), 3);
        assert_eq!(ItemFamily::Ggum.category_count(1, Some(3)), 4);
        let hcm = ItemFamily::Unfolding(UnfoldingLink::Hcm);
        assert_eq!(hcm.category_count(1, Some(2)), 3);
    }

    #[test]
    fn paralla_log_psi_is_negative_infinity_at_zero() {
        assert_eq!(UnfoldingLink::Paralla.log_psi(0.0), f64::NEG_INFINITY);
        assert!((UnfoldingLink::Alm.log_psi(-2.0) - 2.0).abs() < 1e-12);
    }
}
