use std::{
    fs::File,
    io::{Read, Write},
    path::Path,
};

use super::codec::{decode, encode};
use crate::{df::frame::SparseFrame, error::Result, toolkit::array::AFloat};

impl<T: AFloat> SparseFrame<T> {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        self.save_to(&mut file)
    }
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = File::open(path)?;
        SparseFrame::load_from(&mut file)
    }
    pub fn save_to(&self, file: &mut impl Write) -> Result<()> {
        file.write_all(&encode(self))?;
        Ok(())
    }
    pub fn load_from(file: &mut impl Read) -> Result<Self> {
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        decode(bytes.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::df::io::codec::tests::get_test_frame;
    use tempfile::tempdir;

    #[test]
    fn test_fs_io() {
        let sf = get_test_frame();
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("t0.sfdf");
        let mut file = File::create(&file_path).unwrap();
        sf.save_to(&mut file).unwrap();
        drop(file);
        let mut file = File::open(&file_path).unwrap();
        let loaded = SparseFrame::<f64>::load_from(&mut file).unwrap();
        assert_eq!(sf, loaded);
        let file_path = dir.path().join("t1.sfdf");
        sf.save(&file_path).unwrap();
        let loaded = SparseFrame::<f32>::load(&file_path).unwrap();
        assert_eq!(loaded.shape(), (2, 3));
        assert_eq!(loaded.to_dense()[[0, 2]], 2.5f32);
        dir.close().unwrap();
    }
}
