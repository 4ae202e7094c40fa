//! Class taxonomy used to label boxes.
//!
//! The catalog is an ordered, closed list of species codes. "All" is a filter
//! value for image listing only and never a valid class for a box, so it is
//! modelled as [`ClassFilter::All`] rather than as a catalog entry.

use std::fmt;

pub type ClassId = u32;

/// Name of the filter-only pseudo class.
pub const ALL_CLASSES_LABEL: &str = "All";

/// Species codes served by the detection model, in model index order.
const WILDLIFE_CLASSES: &[(ClassId, &str)] = &[
    (0, "anat_elli"),
    (1, "anti_cerv"),
    (2, "arct_coll"),
    (3, "athe_macr"),
    (4, "axis_axis"),
    (5, "axis_porc"),
    (6, "bats_bats"),
    (7, "bird_bird"),
    (8, "blan_blan"),
    (9, "bos__fron"),
    (10, "bos__gaur"),
    (11, "bos__indi"),
    (12, "bose_trag-Boselaphus tragocamelus"),
    (13, "budo_taxi-Budorcas taxicolor"),
    (14, "call_pyge-Callosciurus pygerythrus"),
    (15, "came_came-Camel"),
    (16, "cani_aure-Canis aureus"),
    (17, "cani_lupu-Canis lupus"),
    (18, "capr_hisp-Caprolagus hispidus"),
    (19, "capr_thar-Capricornis thar"),
    (20, "cato_temm-Catopuma temminckii"),
    (21, "catt_catt-Cattle"),
    (22, "catt_kill"),
    (23, "cuon_alpi-Cuon alpinus"),
    (24, "dome_cats-Domestic cat"),
    (25, "dome_dogs-Domestic dog"),
    (26, "elep_maxi-Elephas maximus"),
    (27, "equu_caba-Equus caballus"),
    (28, "feli_chau-Felis chaus"),
    (29, "feli_sylv-Felis sylvestris"),
    (30, "fran_pond-Francolinus pondicerianus"),
    (31, "funa_palm-Funambulus palmarum"),
    (32, "gall_gall-Gallus gallus"),
    (33, "gall_lunu-Galloperdix lunulata"),
    (34, "gall_sonn-Gallus sonneratii"),
    (35, "gall_spad-Galloperdix spadicea"),
    (36, "gaze_benn-Gazella bennettii"),
    (37, "goat_sheep"),
    (38, "hela_mala-Helarctos malayanus"),
    (39, "herp_edwa-Herpestes edwardsii"),
    (40, "herp_fusc-Herpestes fuscus"),
    (41, "herp_smit-Herpestes smithii"),
    (42, "herp_urva-Herpestes urva"),
    (43, "herp_vitt-Herpestes vitticollis"),
    (44, "homo_sapi"),
    (45, "hyae_hyae-Hyaena hyaena"),
    (46, "hyst_brac-Hystrix brachyura"),
    (47, "hyst_indi-Hystrix indica"),
    (48, "lept_java-Leptoptilos javanicus"),
    (49, "lepu_nigr-Lepus nigricollis"),
    (50, "lutr_lutr-Lutra lutra"),
    (51, "lutr_pers-Lutrogale perspicillata"),
    (52, "maca_arct-Macaca arctoides"),
    (53, "maca_assa-Macaca assamensis"),
    (54, "maca_leon-Macaca leonina"),
    (55, "maca_maca-Macaque"),
    (56, "maca_mula-Macaca mulatta"),
    (57, "maca_munz-Macaca munzala"),
    (58, "maca_radi-Macaca radiata"),
    (59, "maca_sile-Macaca silenus"),
    (60, "mani_cras-Manis crassicaudata"),
    (61, "mart_flav-Martes flavigula"),
    (62, "mart_gwat-Martes gwatkinsii"),
    (63, "mell_cape-Mellivora capensis"),
    (64, "melo_pers"),
    (65, "melu_ursi"),
    (66, "mosc_indi-Moschiola indica"),
    (67, "munt_munt-Muntiacus muntjak"),
    (68, "naem_gora-Naemorhedus goral"),
    (69, "neof_nebu-Neofelis nebulosa"),
    (70, "nilg_hylo-Nilgiritragus hylocrius"),
    (71, "pagu_larv-Paguma larvata-Masked Palm Civet"),
    (72, "pant_pard-Panthera pardus"),
    (73, "pant_tigr"),
    (74, "para-jerd-Paradoxurus jerdoni"),
    (75, "para_herm-Paradoxurus hermaphroditus"),
    (76, "pard_marm-Pardofelis marmorata"),
    (77, "pavo_cris"),
    (78, "prio_beng-Prionailurus bengalensis"),
    (79, "prio_pard-Prionodon pardicolor"),
    (80, "prio_rubi-Prionailurus rubiginosus"),
    (81, "prio_vive-Prionailurus viverrinus"),
    (82, "rusa_unic-Rusa unicolor"),
    (83, "semn_ente-Semnopithecus entellus"),
    (84, "semn_john+Semnopithecus johnii"),
    (85, "sus__scro-Sus scrofa"),
    (86, "tetr_quad-Tetracerus quadricornis"),
    (87, "trac_john-Trachypithecus johnii"),
    (88, "trac_pile-Trachypithecus pileatus"),
    (89, "tree_shre"),
    (90, "ursu_thib-Ursus thibetanus"),
    (91, "vara_beng-Varanus bengalensis"),
    (92, "vara_salv-Varanus salvator"),
    (93, "vehi_vehi"),
    (94, "vive_indi-Viverricula indica"),
    (95, "vive_zibe-Viverra zibetha"),
    (96, "vulp_beng"),
    (97, "vulp_vulp"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassEntry {
    pub id: ClassId,
    pub name: String,
}

/// Selection in the image list filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClassFilter {
    #[default]
    All,
    Class(ClassId),
}

/// Ordered mapping from class id to display name.
///
/// Passed explicitly to sessions so tests can use small catalogs.
#[derive(Debug, Clone, Default)]
pub struct ClassCatalog {
    entries: Vec<ClassEntry>,
}

impl ClassCatalog {
    /// Builds a catalog, dropping any entry named like the "All" pseudo class.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (ClassId, S)>,
        S: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(id, name)| ClassEntry {
                id,
                name: name.into(),
            })
            .filter(|entry| !is_all_label(&entry.name))
            .collect();
        Self { entries }
    }

    /// The wildlife taxonomy the detection backend is trained on.
    pub fn wildlife() -> Self {
        Self::new(WILDLIFE_CLASSES.iter().copied())
    }

    /// Every class a box may carry, in catalog order.
    pub fn selectable(&self) -> &[ClassEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn first_selectable(&self) -> Option<&ClassEntry> {
        self.entries.first()
    }

    pub fn get(&self, id: ClassId) -> Option<&ClassEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn contains(&self, id: ClassId) -> bool {
        self.get(id).is_some()
    }

    /// Case-insensitive lookup by name, ignoring surrounding whitespace.
    pub fn find_by_name(&self, name: &str) -> Option<&ClassEntry> {
        let wanted = name.trim();
        self.entries
            .iter()
            .find(|entry| entry.name.trim().eq_ignore_ascii_case(wanted))
    }

    /// Entry to show for a box: its own class when valid, else the first one.
    pub fn display_entry(&self, id: Option<ClassId>) -> Option<&ClassEntry> {
        id.and_then(|id| self.get(id))
            .or_else(|| self.first_selectable())
    }

    /// Resolves a class reference for persistence.
    ///
    /// Returns the entry and whether a substitution happened. None only when
    /// the catalog is empty.
    pub fn resolve(&self, id: Option<ClassId>) -> Option<ClassResolution<'_>> {
        if let Some(entry) = id.and_then(|id| self.get(id)) {
            return Some(ClassResolution {
                entry,
                substituted: false,
            });
        }
        self.first_selectable().map(|entry| ClassResolution {
            entry,
            substituted: true,
        })
    }

    pub fn filter_label(&self, filter: ClassFilter) -> &str {
        match filter {
            ClassFilter::All => ALL_CLASSES_LABEL,
            ClassFilter::Class(id) => self
                .get(id)
                .map(|entry| entry.name.as_str())
                .unwrap_or(ALL_CLASSES_LABEL),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClassResolution<'a> {
    pub entry: &'a ClassEntry,
    pub substituted: bool,
}

impl fmt::Display for ClassEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

fn is_all_label(name: &str) -> bool {
    name.trim().eq_ignore_ascii_case(ALL_CLASSES_LABEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildlife_catalog_is_ordered_and_complete() {
        let catalog = ClassCatalog::wildlife();
        assert_eq!(catalog.len(), 98);
        assert_eq!(catalog.first_selectable().map(|e| e.id), Some(0));
        assert!(catalog
            .selectable()
            .windows(2)
            .all(|pair| pair[0].id < pair[1].id));
    }

    #[test]
    fn test_all_is_never_selectable() {
        let catalog = ClassCatalog::new([(7, " all "), (1, "deer"), (2, "boar")]);
        assert_eq!(catalog.len(), 2);
        assert!(catalog.find_by_name("All").is_none());
        assert_eq!(catalog.first_selectable().map(|e| e.name.as_str()), Some("deer"));
    }

    #[test]
    fn test_resolve_substitutes_unknown_ids() {
        let catalog = ClassCatalog::new([(3, "tiger"), (4, "leopard")]);

        let known = catalog.resolve(Some(4)).unwrap();
        assert_eq!(known.entry.id, 4);
        assert!(!known.substituted);

        let unknown = catalog.resolve(Some(99)).unwrap();
        assert_eq!(unknown.entry.id, 3);
        assert!(unknown.substituted);

        let missing = catalog.resolve(None).unwrap();
        assert!(missing.substituted);

        assert!(ClassCatalog::default().resolve(Some(1)).is_none());
    }

    #[test]
    fn test_find_by_name_is_case_insensitive() {
        let catalog = ClassCatalog::wildlife();
        assert_eq!(catalog.find_by_name("PANT_TIGR").map(|e| e.id), Some(73));
        assert_eq!(catalog.filter_label(ClassFilter::Class(73)), "pant_tigr");
        assert_eq!(catalog.filter_label(ClassFilter::All), ALL_CLASSES_LABEL);
    }
}
