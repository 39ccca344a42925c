use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::mass::{Mass, H2O};
use crate::peptide::Peptide;
use crate::Error;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    A,
    B,
    C,
    X,
    Y,
    Z,
}

impl Kind {
    /// Compact code used when fragment types are persisted as a flat array
    pub fn code(self) -> i8 {
        match self {
            Kind::A => 0,
            Kind::B => 1,
            Kind::C => 2,
            Kind::X => 3,
            Kind::Y => 4,
            Kind::Z => 5,
        }
    }
}

/// Theoretical fragment ion
#[derive(Copy, Clone, Debug)]
pub struct Ion {
    pub kind: Kind,
    /// Neutral fragment mass (no charge)
    pub monoisotopic_mass: f32,
}

/// Residue masses of a peptide, with modification deltas already folded in
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Composition {
    pub masses: Vec<f32>,
    /// N-terminal modification delta
    pub nterm: f32,
    /// Neutral precursor mass
    pub monoisotopic: f32,
}

impl Composition {
    pub fn new(peptide: &Peptide, mods_mass: &HashMap<String, f32>) -> Result<Self, Error> {
        let lookup = |tag: &str| {
            mods_mass
                .get(tag)
                .copied()
                .ok_or_else(|| Error::UnknownModificationMass(tag.into()))
        };

        let mut masses = peptide
            .sequence
            .iter()
            .map(|resi| match resi.tag() {
                Some(tag) => Ok(resi.residue().monoisotopic() + lookup(tag)?),
                None => Ok(resi.residue().monoisotopic()),
            })
            .collect::<Result<Vec<f32>, Error>>()?;

        let nterm = match &peptide.nterm {
            Some(tag) => lookup(tag)?,
            None => 0.0,
        };
        if let (Some(tag), Some(last)) = (&peptide.cterm, masses.last_mut()) {
            *last += lookup(tag)?;
        }

        let monoisotopic = masses.iter().sum::<f32>() + nterm + H2O;
        Ok(Composition {
            masses,
            nterm,
            monoisotopic,
        })
    }
}

/// Generate fragment ions for a candidate peptide
pub struct IonSeries<'p> {
    pub kind: Kind,
    cumulative_mass: f32,
    composition: &'p Composition,
    idx: usize,
}

impl<'p> IonSeries<'p> {
    /// Create a new [`IonSeries`] iterator for a specified peptide
    pub fn new(composition: &'p Composition, kind: Kind) -> Self {
        const C: f32 = 12.0;
        const O: f32 = 15.994914;
        const H: f32 = 1.007825;
        const PRO: f32 = 1.0072764;
        const N: f32 = 14.003074;
        const NH3: f32 = N + H * 2.0 + PRO;

        let nterm = composition.nterm;
        let cumulative_mass = match kind {
            Kind::A => nterm - (C + O),
            Kind::B => nterm,
            Kind::C => nterm + NH3,
            Kind::X => composition.monoisotopic - nterm + (C + O - NH3 + N + H),
            Kind::Y => composition.monoisotopic - nterm,
            Kind::Z => composition.monoisotopic - nterm - NH3,
        };
        Self {
            kind,
            cumulative_mass,
            composition,
            idx: 0,
        }
    }
}

impl<'p> Iterator for IonSeries<'p> {
    type Item = Ion;

    // Dynamic programming solution - memoize cumulative mass of
    // peptide fragment for fast fragment ion generation
    fn next(&mut self) -> Option<Self::Item> {
        if self.idx + 1 >= self.composition.masses.len() {
            return None;
        }
        let m = self.composition.masses.get(self.idx)?;

        self.cumulative_mass += match self.kind {
            Kind::A | Kind::B | Kind::C => *m,
            Kind::X | Kind::Y | Kind::Z => -*m,
        };
        self.idx += 1;

        Some(Ion {
            kind: self.kind,
            monoisotopic_mass: self.cumulative_mass,
        })
    }
}

/// Precursor mass, peptide string and fragment ions of a library entry
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TheoreticalSpectrum {
    pub precursor: f32,
    pub peptide: String,
    pub fragments: Vec<f32>,
    pub kinds: Vec<Kind>,
}

/// Turns a candidate peptide into its theoretical spectrum. Fragment
/// matching and scoring live elsewhere; this is the only contract the
/// library builder needs.
pub trait Fragmenter {
    fn fragment(&self, peptide: &Peptide) -> Result<TheoreticalSpectrum, Error>;
}

/// Default [`Fragmenter`]: neutral fragment masses for the configured ion kinds
#[derive(Clone, Debug)]
pub struct IonFragmenter {
    pub ion_kinds: Vec<Kind>,
    pub mods_mass: HashMap<String, f32>,
}

impl Fragmenter for IonFragmenter {
    fn fragment(&self, peptide: &Peptide) -> Result<TheoreticalSpectrum, Error> {
        let composition = Composition::new(peptide, &self.mods_mass)?;
        let (fragments, kinds) = self
            .ion_kinds
            .iter()
            .flat_map(|kind| IonSeries::new(&composition, *kind))
            .map(|ion| (ion.monoisotopic_mass, ion.kind))
            .unzip();
        Ok(TheoreticalSpectrum {
            precursor: composition.monoisotopic,
            peptide: peptide.to_string(),
            fragments,
            kinds,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mass::PROTON;
    use crate::modification::default_masses;

    fn composition(s: &str) -> Composition {
        Composition::new(&s.parse().unwrap(), &default_masses()).unwrap()
    }

    fn check_within<I: Iterator<Item = Ion>>(iter: I, expected_mz: &[f32]) {
        let observed = iter.map(|ion| ion.monoisotopic_mass).collect::<Vec<f32>>();
        assert_eq!(expected_mz.len(), observed.len());
        assert!(
            expected_mz
                .iter()
                .zip(observed.iter())
                .all(|(a, b)| (a - b).abs() < 0.005),
            "{:?}",
            expected_mz
                .iter()
                .zip(observed.iter())
                .map(|(a, b)| a - b)
                .collect::<Vec<_>>()
        );
    }

    macro_rules! ions {
        ($composition:expr, $kind:expr, $charge:expr) => {{
            IonSeries::new($composition, $kind).map(|mut ion| {
                ion.monoisotopic_mass = (ion.monoisotopic_mass + $charge * PROTON) / $charge;
                ion
            })
        }};
    }

    #[test]
    fn abc_xyz() {
        let peptide = composition("PEPTIDE");
        let expected_a = vec![70.065, 199.108, 296.160, 397.208, 510.292, 625.32];
        let expected_b = vec![98.0600, 227.1026, 324.155, 425.2030, 538.287, 653.314];
        let expected_c = vec![115.086, 244.129, 341.182, 442.229, 555.314, 670.341];
        let expected_x = vec![729.294, 600.251, 503.198, 402.151, 289.066, 174.039];
        let expected_y = vec![703.314, 574.2719, 477.219, 376.171, 263.0874, 148.0604];
        let expected_z = vec![686.288, 557.245, 460.193, 359.145, 246.061, 131.034];

        check_within(ions!(&peptide, Kind::A, 1.0), &expected_a);
        check_within(ions!(&peptide, Kind::B, 1.0), &expected_b);
        check_within(ions!(&peptide, Kind::C, 1.0), &expected_c);
        check_within(ions!(&peptide, Kind::X, 1.0), &expected_x);
        check_within(ions!(&peptide, Kind::Y, 1.0), &expected_y);
        check_within(ions!(&peptide, Kind::Z, 1.0), &expected_z);
    }

    #[test]
    fn decoy() {
        let peptide = composition("PEPTIDE");

        // Charge state 2
        let expected_mz = vec![
            352.16087, 287.639_6, 239.11319, 188.58935, 132.04732, 74.53385,
        ];
        check_within(ions!(&peptide, Kind::Y, 2.0), &expected_mz);

        let peptide = composition("EDITPEP");

        // Charge state 2
        let expected_mz = vec![
            336.16596, 278.652_5, 222.110_46, 171.586_62, 123.060237, 58.538_94,
        ];
        check_within(ions!(&peptide, Kind::Y, 2.0), &expected_mz);
    }

    #[test]
    fn modified_precursor() {
        let plain = composition("PEPMIDE");
        let oxidized = composition("PEPoxMIDE");
        let acetyl = Composition::new(
            &Peptide {
                nterm: Some("a".into()),
                ..Peptide::unmodified("PEPMIDE")
            },
            &default_masses(),
        )
        .unwrap();
        assert!((oxidized.monoisotopic - plain.monoisotopic - 15.994915).abs() < 0.001);
        assert!((acetyl.monoisotopic - plain.monoisotopic - 42.010565).abs() < 0.001);
        // b ions carry the N-terminal delta, y ions do not
        let b1 = IonSeries::new(&acetyl, Kind::B).next().unwrap();
        assert!((b1.monoisotopic_mass - (97.05276 + 42.010565)).abs() < 0.001);
        let y_plain = IonSeries::new(&plain, Kind::Y).next().unwrap();
        let y_acetyl = IonSeries::new(&acetyl, Kind::Y).next().unwrap();
        assert!((y_plain.monoisotopic_mass - y_acetyl.monoisotopic_mass).abs() < 0.001);
    }

    #[test]
    fn unknown_tag() {
        let fragmenter = IonFragmenter {
            ion_kinds: vec![Kind::B, Kind::Y],
            mods_mass: default_masses(),
        };
        let err = fragmenter.fragment(&"PEPzzMIDE".parse().unwrap()).unwrap_err();
        assert!(matches!(err, Error::UnknownModificationMass(tag) if tag == "zz"));

        let spectrum = fragmenter.fragment(&"PEPTIDE".parse().unwrap()).unwrap();
        assert_eq!(spectrum.peptide, "PEPTIDE");
        assert_eq!(spectrum.fragments.len(), 12);
        assert!(spectrum.kinds[..6].iter().all(|k| *k == Kind::B));
        assert!(spectrum.kinds[6..].iter().all(|k| *k == Kind::Y));
    }
}
