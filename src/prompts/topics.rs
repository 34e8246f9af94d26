//! 主题上下文
//!
//! 按查询文本中的关键词命中数选出一个主题，把该主题的背景知识追加到系统提示；
//! 平局取声明顺序靠前者，零命中不增强。

/// 一个主题：名字、触发关键词、追加到系统提示的背景文本
pub struct TopicContext {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    pub context: &'static str,
}

pub const DARK_MATTER: TopicContext = TopicContext {
    name: "dark_matter",
    keywords: &[
        "dark matter",
        "wimp",
        "axion",
        "macho",
        "halo",
        "rotation curve",
        "bullet cluster",
        "direct detection",
        "xenon",
        "lensing",
    ],
    context: "Topic context: dark matter.\nDark matter accounts for roughly 27% of the energy density of the universe (Planck 2018: Omega_c h^2 = 0.120). Evidence includes galaxy rotation curves, gravitational lensing, the Bullet Cluster and the relative heights of the CMB acoustic peaks. Leading candidates are WIMPs, axions and primordial black holes; current direct-detection experiments include LUX-ZEPLIN, XENONnT and PandaX-4T, none of which has reported a confirmed signal.",
};

pub const EXOPLANET: TopicContext = TopicContext {
    name: "exoplanet",
    keywords: &[
        "exoplanet",
        "transit",
        "radial velocity",
        "habitable",
        "kepler",
        "tess",
        "hot jupiter",
        "super-earth",
        "planetary system",
        "biosignature",
    ],
    context: "Topic context: exoplanets.\nMore than 5,000 exoplanets are confirmed. Main detection methods: transit photometry (Kepler, TESS), radial velocity (HARPS, ESPRESSO), direct imaging and gravitational microlensing. Transit depth gives the planet-to-star radius ratio; radial velocity gives a minimum mass. JWST transmission spectroscopy probes atmospheres for water, CO2, methane and other potential biosignature gases.",
};

pub const CMB: TopicContext = TopicContext {
    name: "cmb",
    keywords: &[
        "cmb",
        "cosmic microwave background",
        "planck",
        "wmap",
        "cobe",
        "recombination",
        "acoustic",
        "polarization",
        "last scattering",
        "reionization",
    ],
    context: "Topic context: cosmic microwave background.\nThe CMB is a 2.725 K blackbody released at recombination (z ~ 1100), with temperature anisotropies of order 1e-5. The acoustic peak structure constrains the geometry of the universe, the baryon density and dark matter density; Planck 2018 gives H0 = 67.4 km/s/Mpc and Omega_m = 0.315. E-mode polarization is measured in detail, while primordial B-modes from inflationary gravitational waves remain a target of current experiments.",
};

/// 声明顺序即平局时的优先顺序
const TOPICS: &[&TopicContext] = &[&DARK_MATTER, &EXOPLANET, &CMB];

/// 选出关键词命中最多的主题；零命中返回 None
pub fn detect_topic(query: &str) -> Option<&'static TopicContext> {
    let lower = query.to_lowercase();
    let mut best: Option<(&'static TopicContext, usize)> = None;
    for topic in TOPICS {
        let hits = topic
            .keywords
            .iter()
            .filter(|k| lower.contains(*k))
            .count();
        if hits == 0 {
            continue;
        }
        match best {
            Some((_, best_hits)) if hits <= best_hits => {}
            _ => best = Some((topic, hits)),
        }
    }
    best.map(|(topic, _)| topic)
}

/// 若查询命中主题，把主题背景追加到系统提示
pub fn enhance_system_prompt(base: &str, query: &str) -> String {
    match detect_topic(query) {
        Some(topic) => {
            tracing::debug!(topic = topic.name, "topic context attached");
            format!("{}\n\n{}", base, topic.context)
        }
        None => base.to_string(),
    }
}
