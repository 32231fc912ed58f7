use std::fmt::{self, Display, Formatter};

use super::link::Image;

/// The link map of an image: where each module was placed, followed
/// by the final symbol table.
pub struct LinkMap<'a> {
    image: &'a Image,
}

impl<'a> LinkMap<'a> {
    pub fn new(image: &'a Image) -> LinkMap<'a> {
        LinkMap { image }
    }
}

impl Display for LinkMap<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<20} {:>6} {:>6}", "MODULE", "BASE", "SIZE")?;
        for placement in self.image.placements() {
            writeln!(
                f,
                "{:<20} {:>6} {:>6}",
                placement.module, placement.base, placement.size
            )?;
        }
        writeln!(f)?;
        writeln!(f, "{:<20} {:>6}", "SYMBOL", "OFFSET")?;
        write!(f, "{}", self.image.symbols())
    }
}
