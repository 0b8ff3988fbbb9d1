//! Fixed legal topic vocabulary and the per-topic factor tables that drive
//! missing-fact detection and clarification questions.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    PropertyDivision,
    ChildrenParenting,
    SpousalMaintenance,
    FamilyViolenceSafety,
    PrenupPostnup,
    Other,
}

impl Topic {
    /// The fixed topic set, excluding the `Other` catch-all.
    pub const ALL: [Topic; 5] = [
        Topic::PropertyDivision,
        Topic::ChildrenParenting,
        Topic::SpousalMaintenance,
        Topic::FamilyViolenceSafety,
        Topic::PrenupPostnup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::PropertyDivision => "property_division",
            Topic::ChildrenParenting => "children_parenting",
            Topic::SpousalMaintenance => "spousal_maintenance",
            Topic::FamilyViolenceSafety => "family_violence_safety",
            Topic::PrenupPostnup => "prenup_postnup",
            Topic::Other => "other",
        }
    }

    /// Parse a topic identifier. Anything outside the fixed vocabulary maps
    /// to `Other` — a malformed classifier response is not corrected here.
    pub fn parse(value: &str) -> Topic {
        let cleaned = value.trim().trim_matches(|c| c == '"' || c == '\'');
        match cleaned.to_lowercase().as_str() {
            "property_division" => Topic::PropertyDivision,
            "children_parenting" => Topic::ChildrenParenting,
            "spousal_maintenance" => Topic::SpousalMaintenance,
            "family_violence_safety" => Topic::FamilyViolenceSafety,
            "prenup_postnup" => Topic::PrenupPostnup,
            _ => Topic::Other,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Topic::PropertyDivision => "Property Division",
            Topic::ChildrenParenting => "Children & Parenting",
            Topic::SpousalMaintenance => "Spousal Maintenance",
            Topic::FamilyViolenceSafety => "Family Violence & Safety",
            Topic::PrenupPostnup => "Pre/Post-Nuptial Agreement",
            Topic::Other => "General Family Law",
        }
    }

    /// Topic-specific instruction injected into the synthesis prompt: one of
    /// four fixed legal-test descriptions, or a generic fallback.
    pub fn instruction(&self) -> &'static str {
        match self {
            Topic::PropertyDivision => {
                "Apply the 'Four-Step Process' (Pool, Contributions, s 75(2) Future Needs, and Just & Equitable)."
            }
            Topic::ChildrenParenting => {
                "Apply the 'Best Interests of the Child' framework (Section 60CC), focusing on safety, developmental needs, and the benefit of a relationship with both parents."
            }
            Topic::SpousalMaintenance => {
                "Apply the 'Threshold Test' (Section 72): One party's inability to support themselves vs. the other party's capacity to pay."
            }
            Topic::PrenupPostnup => {
                "Assess the binding financial agreement against Sections 90B-90KA: formal validity, disclosure, and the grounds for setting it aside."
            }
            _ => "Assess the situation based on the relevant sections of the Family Law Act 1975.",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One required factor for a topic: the field it patches in the case summary,
/// the keywords that mark it as already covered, and the question shown to
/// the client when it is not.
#[derive(Debug)]
pub struct FactorSpec {
    pub id: &'static str,
    pub label: &'static str,
    pub keywords: &'static [&'static str],
    pub question: &'static str,
}

/// Ordered factor tables per topic. A factor counts as present when any of
/// its keywords occurs in the known-fact text (case-insensitive substring).
/// Keyword lists are deliberately broad: the cost of a false "missing" is one
/// extra client question, never a wrong answer.
pub fn factors(topic: Topic) -> &'static [FactorSpec] {
    match topic {
        Topic::PropertyDivision => PROPERTY_FACTORS,
        Topic::ChildrenParenting => PARENTING_FACTORS,
        Topic::SpousalMaintenance => MAINTENANCE_FACTORS,
        Topic::FamilyViolenceSafety => VIOLENCE_FACTORS,
        Topic::PrenupPostnup => AGREEMENT_FACTORS,
        Topic::Other => &[],
    }
}

static PROPERTY_FACTORS: &[FactorSpec] = &[
    FactorSpec {
        id: "asset_pool",
        label: "asset pool",
        keywords: &["asset", "assets", "liability", "debt", "mortgage", "value"],
        question: "Could you provide details about the asset pool, including values for property, superannuation, and any debts?",
    },
    FactorSpec {
        id: "contributions",
        label: "contributions",
        keywords: &[
            "financial",
            "contribution",
            "income",
            "salary",
            "payment",
            "non-financial",
            "renovation",
            "improvement",
            "un-remunerated",
            "to the welfare of the family",
            "homemaker",
            "domestic labour",
            "cooking",
            "cleaning",
            "laundry",
            "gardening",
            "caregiver",
            "childcare",
            "school pickup",
            "school dropoff",
            "feeding",
            "bathing",
        ],
        question: "Please describe both the financial contributions (like salary) and non-financial contributions (like homemaking/parenting) made by each party.",
    },
    FactorSpec {
        id: "future_needs",
        label: "future needs",
        keywords: &[
            "income",
            "income-earning disparity",
            "effect of orders on income-earning capacity",
            "health",
            "age",
            "care and control of children",
            "caring responsibility for other persons",
            "caregiver",
            "necessary living expenses",
            "reasonable standard of living",
        ],
        question: "Are there any factors affecting future needs, such as a significant difference in income-earning capacity or health issues?",
    },
    FactorSpec {
        id: "existing_agreements",
        label: "existing agreements",
        keywords: &["agreement", "bfa", "binding", "order"],
        question: "Are there any existing BFAs, child support agreements, or court orders already in place?",
    },
];

static PARENTING_FACTORS: &[FactorSpec] = &[
    FactorSpec {
        id: "child_ages",
        label: "child ages",
        keywords: &["age", "school", "toddler", "teen"],
        question: "What are the ages of the children? This helps determine their developmental needs.",
    },
    FactorSpec {
        id: "current_arrangements",
        label: "current parenting arrangements",
        keywords: &["currently", "live", "reside", "weekend", "schedule"],
        question: "What is the current schedule? Please describe where the children live and how much time they spend with each parent.",
    },
    FactorSpec {
        id: "caregiver_history",
        label: "caregiver history",
        keywords: &["primary", "carer", "caregiver", "routine"],
        question: "Who has historically been the primary caregiver for the children's daily routines?",
    },
    FactorSpec {
        id: "availability",
        label: "parental availability",
        keywords: &["work", "hours", "shift", "availability", "travel"],
        question: "What are the parents' work schedules or availability to care for the children during the week?",
    },
    FactorSpec {
        id: "safety_concerns",
        label: "safety concerns",
        keywords: &["violence", "abuse", "safety", "order"],
        question: "Are there any family violence or safety risks we should be aware of regarding the children's environment?",
    },
    FactorSpec {
        id: "child_views",
        label: "child views",
        keywords: &["child", "preference", "wish", "view"],
        question: "Have the children expressed any particular wishes or views regarding their living arrangements?",
    },
];

static MAINTENANCE_FACTORS: &[FactorSpec] = &[
    FactorSpec {
        id: "income_expenses",
        label: "income and expenses",
        keywords: &["income", "expense", "budget", "cost", "pay"],
        question: "What are your current weekly/monthly income and necessary living expenses?",
    },
    FactorSpec {
        id: "earning_capacity",
        label: "earning capacity",
        keywords: &["work", "job", "employ", "capacity", "qualification"],
        question: "What are your professional qualifications, and is there anything currently preventing you from working full-time?",
    },
    FactorSpec {
        id: "health_care",
        label: "health care",
        keywords: &["health", "illness", "disability", "care"],
        question: "Are there any ongoing health issues or disabilities that require significant care or expense?",
    },
    FactorSpec {
        id: "relationship_length",
        label: "relationship length",
        keywords: &["years", "duration", "relationship", "marriage"],
        question: "How many years were you in the relationship or marriage?",
    },
    FactorSpec {
        id: "standard_of_living",
        label: "standard of living",
        keywords: &["lifestyle", "standard", "living"],
        question: "How would you describe the standard of living enjoyed during the relationship?",
    },
];

static VIOLENCE_FACTORS: &[FactorSpec] = &[
    FactorSpec {
        id: "incidents",
        label: "violence or abuse incidents",
        keywords: &["incident", "violence", "abuse", "threat", "assault"],
        question: "Could you describe any specific incidents of violence, threats, or coercive control?",
    },
    FactorSpec {
        id: "protection_orders",
        label: "protection orders",
        keywords: &["order", "avro", "intervention", "restraining"],
        question: "Are there currently any AVOs, IVOs, or other protection orders in place?",
    },
    FactorSpec {
        id: "police_court",
        label: "police or court involvement",
        keywords: &["police", "court", "report", "charge"],
        question: "Have there been any police reports filed or criminal charges laid related to family violence?",
    },
    FactorSpec {
        id: "child_exposure",
        label: "child exposure",
        keywords: &["child", "witness", "exposed"],
        question: "Were the children present during or exposed to the effects of any violent incidents?",
    },
    FactorSpec {
        id: "safety_plan",
        label: "safety plan",
        keywords: &["safety", "plan", "support", "shelter"],
        question: "Do you currently have a safety plan or support services in place?",
    },
];

static AGREEMENT_FACTORS: &[FactorSpec] = &[
    FactorSpec {
        id: "agreement_date",
        label: "agreement date",
        keywords: &["date", "signed", "before", "after"],
        question: "When was the agreement signed? Was it before (Section 90B) or after (Section 90C) the marriage?",
    },
    FactorSpec {
        id: "legal_advice",
        label: "independent legal advice",
        keywords: &["lawyer", "legal", "advice", "independent"],
        question: "Did both parties receive independent legal advice from separate lawyers before signing?",
    },
    FactorSpec {
        id: "financial_disclosure",
        label: "financial disclosure",
        keywords: &["disclosure", "assets", "liabilities", "full"],
        question: "Was there full and frank financial disclosure of all assets and liabilities before signing?",
    },
    FactorSpec {
        id: "pressure_duress",
        label: "pressure or duress",
        keywords: &["pressure", "duress", "coerce", "forced"],
        question: "Was there any pressure, urgency, or 'unfair' circumstances surrounding the signing of the document?",
    },
    FactorSpec {
        id: "changed_circumstances",
        label: "changed circumstances",
        keywords: &["children", "assets", "change", "major"],
        question: "Have there been major changes since signing, such as the birth of a child, that the agreement didn't account for?",
    },
];

/// Search-expansion vocabulary per topic, used to tag the structured
/// retrieval query with legal terms that overlap the question.
pub fn search_keywords(topic: Topic) -> &'static [&'static str] {
    match topic {
        Topic::PropertyDivision => &[
            "asset pool",
            "liabilities",
            "superannuation",
            "valuations",
            "financial contributions",
            "non-financial contributions",
            "homemaker",
            "parenting contributions",
            "future needs",
            "earning capacity",
            "health",
            "age",
            "financial resources",
            "just and equitable",
            "percentage split",
            "initial contributions",
            "inheritance",
        ],
        Topic::ChildrenParenting => &[
            "living arrangements",
            "spend time",
            "communication",
            "changeover",
            "best interests",
            "primary carer",
            "parental responsibility",
            "decision making",
            "safety",
            "risk of harm",
            "family violence",
            "abuse",
            "neglect",
            "child's views",
            "wishes",
            "maturity",
            "expert reports",
            "family consultant",
        ],
        Topic::SpousalMaintenance => &[
            "financial need",
            "adequately support",
            "capacity to pay",
            "income",
            "expenses",
            "budget",
            "shortfall",
            "earning capacity",
            "vocational skills",
            "health",
            "illness",
            "duration of marriage",
            "standard of living",
        ],
        Topic::FamilyViolenceSafety => &[
            "incidents",
            "physical abuse",
            "emotional abuse",
            "coercive control",
            "protection orders",
            "intervention orders",
            "IVOs",
            "AVOs",
            "undertakings",
            "police reports",
            "charges",
            "criminal history",
            "witnesses",
            "impact on children",
            "exposure to violence",
            "safety planning",
        ],
        Topic::PrenupPostnup => &[
            "binding financial agreement",
            "BFA",
            "pre-nuptial",
            "post-nuptial",
            "independent legal advice",
            "certificates of advice",
            "full disclosure",
            "duress",
            "undue influence",
            "unconscionable conduct",
            "pressure",
            "material change in circumstances",
            "hardship",
            "children's impact",
        ],
        Topic::Other => &[],
    }
}
