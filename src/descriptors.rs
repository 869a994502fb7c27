use crate::*;

/// Produces local feature descriptors for an image.
///
/// Implementations are asked for `k` descriptors. Returning any other count
/// is not an error: the image is dropped when the dataset is built. Errors
/// returned here are fatal.
pub trait Extractor {
    type Image;

    fn extract(&self, image: &Self::Image, k: usize) -> BowResult<Vec<Desc>>;
}

/// The descriptors of one image. Always holds exactly the requested count.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorSet {
    descriptors: Vec<Desc>,
}

impl DescriptorSet {
    /// Wrap extracted descriptors, failing unless there are exactly `k` of them.
    pub fn new(descriptors: Vec<Desc>, k: usize) -> BowResult<Self> {
        if descriptors.len() != k {
            return Err(BowErr::InsufficientDescriptors {
                expected: k,
                found: descriptors.len(),
            });
        }
        Ok(Self { descriptors })
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn as_slice(&self) -> &[Desc] {
        &self.descriptors
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Desc> {
        self.descriptors.iter()
    }
}

impl AsRef<[Desc]> for DescriptorSet {
    fn as_ref(&self) -> &[Desc] {
        &self.descriptors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_count_is_accepted() {
        let set = DescriptorSet::new(vec![[0.; DESC_DIM]; 20], 20).unwrap();
        assert_eq!(set.len(), 20);
        assert_eq!(set.as_slice().len(), 20);
    }

    #[test]
    fn short_set_is_rejected() {
        let err = DescriptorSet::new(vec![[0.; DESC_DIM]; 15], 20).unwrap_err();
        assert!(matches!(
            err,
            BowErr::InsufficientDescriptors {
                expected: 20,
                found: 15
            }
        ));
    }

    #[test]
    fn long_set_is_rejected() {
        assert!(DescriptorSet::new(vec![[0.; DESC_DIM]; 21], 20).is_err());
    }
}
