use crate::pixels::SubPixel;

pub trait Stats {
    fn mean(self) -> SubPixel;
    fn variance(self) -> SubPixel;
    fn sd(self) -> SubPixel;
}

impl Stats for std::slice::Iter<'_, SubPixel> {
    fn mean(self) -> SubPixel {
        let length = self.len();
        if length == 0 {
            return 0.0;
        }
        let sum: SubPixel = self.sum();
        sum / length as SubPixel
    }

    fn variance(self) -> SubPixel {
        let len = self.len();
        if len < 2 {
            return 0.0;
        }
        let mean = self.clone().mean();
        self.map(|v| (mean - v) * (mean - v)).sum::<SubPixel>() / (len as SubPixel - 1.0)
    }

    fn sd(self) -> SubPixel {
        self.variance().sqrt()
    }
}
