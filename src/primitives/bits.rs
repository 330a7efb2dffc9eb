use std::{
    fmt::{Debug, Display},
    ops::{BitAnd, BitOrAssign, Shl, Shr},
};

pub trait BitsExt {
    fn from_num(bits: u8) -> Self;
    fn from_bits(bits: Vec<bool>) -> Self;
    fn to_inner(&self) -> u8;
    fn zero() -> Self;
    fn one() -> Self;
    fn bits(&self) -> &[bool];
}

#[derive(PartialEq, Debug)]
pub struct Bits<const N: usize, T> {
    pub bits: [bool; N],
    _phantom: std::marker::PhantomData<T>,
}

impl<const N: usize, T> Bits<N, T>
where
    T: Copy + Clone + Debug + Display, // For format
    T: Shr<usize, Output = T>,         // For >> operator
    T: Shl<usize, Output = T>,         // For << operator
    T: BitAnd<Output = T>,             // For & operator
    T: BitOrAssign,                    // For |= operator
    T: PartialEq + From<u8>,           // For comparison
{
    // size checking enforced at compile-time by T
    pub fn from(bytes: T) -> Self {
        let mut bits: Vec<bool> = Vec::with_capacity(N);
        for i in 0..N {
            let bit = (bytes >> i) & T::from(1) == T::from(1);
            bits.push(bit);
        }
        Self {
            bits: bits
                .try_into()
                .expect(&format!("bytes {} fits into Bits of len {}", bytes, N)),
            _phantom: std::marker::PhantomData,
        }
    }

    pub fn from_bits(bits: Vec<bool>) -> Self {
        Self {
            bits: bits.try_into().expect("properly sized bits"),
            _phantom: std::marker::PhantomData,
        }
    }

    pub fn to_inner(&self) -> T {
        let mut inner: T = T::from(0);
        for i in 0..N {
            if self.bits[i] {
                inner |= T::from(1) << i;
            }
        }
        inner
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }
}
