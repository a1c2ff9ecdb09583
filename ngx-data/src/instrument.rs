use derive_more::Display;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Market sector an [`Instrument`] is listed under.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Display)]
pub enum Sector {
    #[display("Telecoms")]
    Telecoms,
    #[display("Banking")]
    Banking,
    #[display("Construction")]
    Construction,
    #[display("Consumer Goods")]
    ConsumerGoods,
    #[display("Oil & Gas")]
    OilAndGas,
    #[display("Healthcare")]
    Healthcare,
    #[display("Agriculture")]
    Agriculture,
    #[display("Technology")]
    Technology,
    #[display("Real Estate")]
    RealEstate,
    #[display("Conglomerate")]
    Conglomerate,
    #[display("Industrial Goods")]
    IndustrialGoods,
    #[display("Insurance")]
    Insurance,
    #[display("Transportation")]
    Transportation,
    #[display("Investment")]
    Investment,
}

impl Sector {
    pub fn label(&self) -> &'static str {
        match self {
            Sector::Telecoms => "Telecoms",
            Sector::Banking => "Banking",
            Sector::Construction => "Construction",
            Sector::ConsumerGoods => "Consumer Goods",
            Sector::OilAndGas => "Oil & Gas",
            Sector::Healthcare => "Healthcare",
            Sector::Agriculture => "Agriculture",
            Sector::Technology => "Technology",
            Sector::RealEstate => "Real Estate",
            Sector::Conglomerate => "Conglomerate",
            Sector::IndustrialGoods => "Industrial Goods",
            Sector::Insurance => "Insurance",
            Sector::Transportation => "Transportation",
            Sector::Investment => "Investment",
        }
    }
}

/// Immutable listing record.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Instrument {
    pub symbol: SmolStr,
    pub name: SmolStr,
    pub sector: Sector,
    pub base_price: f64,
}

impl Instrument {
    pub fn new(
        symbol: impl Into<SmolStr>,
        name: impl Into<SmolStr>,
        sector: Sector,
        base_price: f64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            name: name.into(),
            sector,
            base_price,
        }
    }
}

/// Fixed, insertion-ordered set of [`Instrument`]s keyed by symbol.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstrumentCatalog {
    instruments: IndexMap<SmolStr, Instrument>,
}

impl InstrumentCatalog {
    /// Build a catalog from `instruments`. When a symbol repeats, the first definition wins.
    pub fn new(instruments: impl IntoIterator<Item = Instrument>) -> Self {
        let mut map = IndexMap::new();
        for instrument in instruments {
            map.entry(instrument.symbol.clone()).or_insert(instrument);
        }
        Self { instruments: map }
    }

    /// The Nigerian Exchange listings the terminal simulates, with July 2025 reference prices.
    pub fn ngx() -> Self {
        Self::new(
            NGX_LISTINGS
                .iter()
                .map(|(symbol, name, sector, price)| Instrument::new(*symbol, *name, *sector, *price)),
        )
    }

    pub fn get(&self, symbol: &str) -> Option<&Instrument> {
        self.instruments.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.instruments.contains_key(symbol)
    }

    pub fn get_index(&self, index: usize) -> Option<&Instrument> {
        self.instruments.get_index(index).map(|(_, instrument)| instrument)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.values()
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

const NGX_LISTINGS: &[(&str, &str, Sector, f64)] = &[
    // Telecoms
    ("MTNN", "MTN Nigeria", Sector::Telecoms, 580.00),
    ("AIRTEL", "Airtel Africa", Sector::Telecoms, 1250.00),
    ("GLOBACOM", "Globacom", Sector::Telecoms, 45.20),
    // Banking
    ("ZENITH", "Zenith Bank", Sector::Banking, 48.50),
    ("GTCO", "GTCO", Sector::Banking, 42.75),
    ("ACCESS", "Access Bank", Sector::Banking, 26.90),
    ("UBA", "UBA", Sector::Banking, 21.20),
    ("FBNH", "First Bank", Sector::Banking, 18.80),
    ("STANBIC", "Stanbic IBTC", Sector::Banking, 58.60),
    ("FCMB", "FCMB", Sector::Banking, 15.50),
    ("WEMA", "Wema Bank", Sector::Banking, 5.20),
    ("UNION", "Union Bank", Sector::Banking, 8.90),
    ("SKYE", "Skye Bank", Sector::Banking, 2.10),
    ("KEYSTONE", "Keystone Bank", Sector::Banking, 1.85),
    ("POLARIS", "Polaris Bank", Sector::Banking, 1.65),
    ("PROVIDUS", "Providus Bank", Sector::Banking, 12.40),
    ("JAIZ", "Jaiz Bank", Sector::Banking, 1.20),
    ("STERLING", "Sterling Bank", Sector::Banking, 3.80),
    // Construction
    ("DANGCEM", "Dangote Cement", Sector::Construction, 720.00),
    ("BUA", "BUA Cement", Sector::Construction, 85.60),
    ("WAPCO", "Lafarge Africa", Sector::Construction, 32.40),
    ("BETAGLAS", "Beta Glass", Sector::Construction, 68.90),
    ("BAGCO", "Berger Paints", Sector::Construction, 18.30),
    ("CUTIX", "Cutix Plc", Sector::Construction, 4.20),
    ("DUNLOP", "Dunlop Nigeria", Sector::Construction, 6.80),
    // Consumer Goods
    ("NESTLE", "Nestle Nigeria", Sector::ConsumerGoods, 1650.00),
    ("GUINNESS", "Guinness Nigeria", Sector::ConsumerGoods, 108.40),
    ("NB", "Nigerian Breweries", Sector::ConsumerGoods, 85.30),
    ("DANGSUGAR", "Dangote Sugar", Sector::ConsumerGoods, 22.70),
    ("NASCON", "Nascon Allied", Sector::ConsumerGoods, 15.40),
    ("UNILEVER", "Unilever Nigeria", Sector::ConsumerGoods, 18.80),
    ("FLOUR", "Flour Mills", Sector::ConsumerGoods, 52.10),
    ("CADBURY", "Cadbury Nigeria", Sector::ConsumerGoods, 12.60),
    ("PZ", "PZ Cussons", Sector::ConsumerGoods, 8.90),
    ("VITAFOAM", "Vitafoam Nigeria", Sector::ConsumerGoods, 22.40),
    ("CHAMPION", "Champion Breweries", Sector::ConsumerGoods, 3.20),
    ("INTERNATIONAL", "International Breweries", Sector::ConsumerGoods, 5.80),
    // Oil & Gas
    ("SEPLAT", "Seplat Energy", Sector::OilAndGas, 1450.00),
    ("TOTAL", "Total Nigeria", Sector::OilAndGas, 355.50),
    ("OANDO", "Oando", Sector::OilAndGas, 14.90),
    ("CONOIL", "Conoil", Sector::OilAndGas, 38.20),
    ("MRS", "MRS Oil", Sector::OilAndGas, 25.80),
    ("FORTE", "Forte Oil", Sector::OilAndGas, 18.60),
    ("EXXON", "Exxon Mobil", Sector::OilAndGas, 185.40),
    ("CHEVRON", "Chevron Nigeria", Sector::OilAndGas, 165.20),
    // Healthcare
    ("FIDSON", "Fidson Healthcare", Sector::Healthcare, 15.80),
    ("MAYBAKER", "May & Baker", Sector::Healthcare, 7.40),
    ("NEIMETH", "Neimeth Pharma", Sector::Healthcare, 2.10),
    ("PHARMDEKO", "Pharmdeko", Sector::Healthcare, 1.85),
    ("GLAXOSMITH", "GlaxoSmithKline", Sector::Healthcare, 12.50),
    ("EVANS", "Evans Medical", Sector::Healthcare, 3.60),
    // Agriculture
    ("OKOMUOIL", "Okomu Oil", Sector::Agriculture, 245.40),
    ("PRESCO", "Presco Plc", Sector::Agriculture, 165.20),
    ("FTNCOCOA", "FTN Cocoa", Sector::Agriculture, 1.85),
    ("ELLAHLAKES", "Ellah Lakes", Sector::Agriculture, 4.40),
    ("LIVESTOCK", "Livestock Feeds", Sector::Agriculture, 2.20),
    ("TANTALIZER", "Tantalizer", Sector::Agriculture, 0.85),
    // Technology
    ("CHAMS", "Chams Plc", Sector::Technology, 0.45),
    ("COURTVILLE", "Courtville", Sector::Technology, 0.38),
    ("E-TRANZACT", "E-Tranzact", Sector::Technology, 4.20),
    ("INTENEGINS", "Intenergins", Sector::Technology, 0.55),
    ("NCR", "NCR Nigeria", Sector::Technology, 3.80),
    ("OMATEK", "Omatek Ventures", Sector::Technology, 0.25),
    // Real Estate
    ("UPDC", "UPDC", Sector::RealEstate, 1.85),
    ("UACPROP", "UAC Property", Sector::RealEstate, 1.45),
    ("SKYEBANK", "Skye Bank", Sector::RealEstate, 0.95),
    // Conglomerates
    ("UACN", "UAC Nigeria", Sector::Conglomerate, 15.80),
    ("TRANSCORP", "Transcorp", Sector::Conglomerate, 2.40),
    ("JOHNHOLT", "John Holt", Sector::Conglomerate, 1.20),
    ("SCOA", "SCOA Nigeria", Sector::Conglomerate, 0.85),
    // Industrial Goods
    ("BERGER", "Berger Paints", Sector::IndustrialGoods, 18.30),
    ("CAP", "CAP Plc", Sector::IndustrialGoods, 26.90),
    ("PAINTCOM", "Paintcom", Sector::IndustrialGoods, 12.40),
    ("VONO", "Vono Products", Sector::IndustrialGoods, 3.60),
    ("TRIPLEG", "TripleG", Sector::IndustrialGoods, 1.85),
    // Insurance
    ("AIICO", "AIICO Insurance", Sector::Insurance, 0.95),
    ("CORNERSTONE", "Cornerstone Insurance", Sector::Insurance, 0.65),
    ("CUSTODIAN", "Custodian Insurance", Sector::Insurance, 8.40),
    ("LASACO", "Lasaco Assurance", Sector::Insurance, 1.20),
    ("NEM", "NEM Insurance", Sector::Insurance, 4.80),
    ("PRESTIGE", "Prestige Assurance", Sector::Insurance, 0.55),
    ("ROYALEX", "Royal Exchange", Sector::Insurance, 0.45),
    ("WAPIC", "Wapic Insurance", Sector::Insurance, 0.35),
    ("MANSARD", "Mansard Insurance", Sector::Insurance, 2.10),
    ("LINKASSURE", "Linkage Assurance", Sector::Insurance, 0.75),
    ("CONSOLIDATED", "Consolidated Hallmark", Sector::Insurance, 0.85),
    // Transportation & Logistics
    ("REDSTAREX", "Red Star Express", Sector::Transportation, 3.20),
    ("ABC", "ABC Transport", Sector::Transportation, 0.85),
    ("CHIPLC", "Custodian Investment", Sector::Investment, 8.40),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ngx_catalog_symbols_are_unique_and_priced() {
        let catalog = InstrumentCatalog::ngx();

        assert_eq!(catalog.len(), NGX_LISTINGS.len());
        assert!(catalog.iter().all(|instrument| instrument.base_price > 0.0));

        let mtnn = catalog.get("MTNN").unwrap();
        assert_eq!(mtnn.name, "MTN Nigeria");
        assert_eq!(mtnn.sector, Sector::Telecoms);
        assert_eq!(mtnn.base_price, 580.00);
    }

    #[test]
    fn test_catalog_first_definition_wins() {
        let catalog = InstrumentCatalog::new([
            Instrument::new("BUA", "BUA Cement", Sector::Construction, 85.60),
            Instrument::new("ZENITH", "Zenith Bank", Sector::Banking, 48.50),
            Instrument::new("BUA", "BUA Foods", Sector::ConsumerGoods, 400.00),
        ]);

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get("BUA").unwrap().name, "BUA Cement");
        assert_eq!(catalog.get_index(1).unwrap().symbol, "ZENITH");
        assert!(!catalog.contains("NOPE"));
    }

    #[test]
    fn test_sector_labels() {
        assert_eq!(Sector::OilAndGas.to_string(), "Oil & Gas");
        assert_eq!(Sector::ConsumerGoods.label(), "Consumer Goods");
    }

    #[test]
    fn test_sector_display_matches_label() {
        let catalog = InstrumentCatalog::ngx();

        for instrument in catalog.iter() {
            assert_eq!(instrument.sector.to_string(), instrument.sector.label());
        }
    }
}
