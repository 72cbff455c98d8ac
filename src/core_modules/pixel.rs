// THEORY (Single-Pixel Heuristics):
// The `Pixel` module is the most fundamental unit of the vision system. It is a
// "dumb" data container for one RGBA pixel plus the handful of single-pixel
// heuristics the mask builders need. Nothing here looks at neighbours or at
// other frames; spatial work (blur, morphology, labeling) lives in `mask`.
//
// Heuristic families:
// - Brightness: luminance (Rec. 601 luma) for the bright-blob mask,
//               HSV value (max channel) for the colour-band mask.
// - Colour:     hue angle in degrees [0, 360) and HSV saturation
//               (chroma / value) for the colour-band mask.
//
// All colour math uses normalized sRGB channels (0..1, still gamma-encoded).
// That mirrors how video tooling usually builds HSV masks and keeps the hot
// path to a few comparisons and one division.

pub mod pixel {
    pub type Byte = u8;
    pub type Channel = Byte;
    pub type NormalizedChannel = f32;
    pub type Hue = f32;
    pub type SaturationHSV = f32;
    pub type ValueHSV = f32;
    pub type Chroma = f32;
    pub type Luminance = f64;

    const CHANNELS: usize = 4;

    /// A "dumb" data container representing a single RGBA pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Default)]
    pub struct Pixel {
        /// The red channel value (0-255).
        pub red: Channel,
        /// The green channel value (0-255).
        pub green: Channel,
        /// The blue channel value (0-255).
        pub blue: Channel,
        /// The alpha (transparency) channel value (0-255).
        pub alpha: Channel,
        /// The red channel value (0.0-1.0).
        pub red_normalized: NormalizedChannel,
        /// The green channel value (0.0-1.0).
        pub green_normalized: NormalizedChannel,
        /// The blue channel value (0.0-1.0).
        pub blue_normalized: NormalizedChannel,
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
            Pixel {
                red,
                green,
                blue,
                alpha,
                red_normalized: red as NormalizedChannel / 255.0f32,
                green_normalized: green as NormalizedChannel / 255.0f32,
                blue_normalized: blue as NormalizedChannel / 255.0f32,
            }
        }

        /// Luminance estimate (Rec. 601 luma) on the 0..255 scale.
        ///
        /// - Same weights video tools use for a BGR/RGB → gray conversion.
        /// - Input to the bright-blob threshold.
        pub fn luminance(&self) -> Luminance {
            0.299_f64 * self.red as f64 + 0.587_f64 * self.green as f64 + 0.114_f64 * self.blue as f64
        }

        /// Hue angle in degrees [0, 360).
        ///
        /// Returns 0.0 for achromatic pixels (chroma ≈ 0), where hue is undefined.
        pub fn hue(&self) -> Hue {
            let maximum_channel = self.value_hsv();
            let minimum_channel = self
                .red_normalized
                .min(self.green_normalized.min(self.blue_normalized));
            let chroma = maximum_channel - minimum_channel;

            if chroma <= 1e-6 {
                return 0.0;
            }

            let inverse_chroma = 1.0 / chroma;

            let (base_difference, sector_offset) = if maximum_channel == self.red_normalized {
                (self.green_normalized - self.blue_normalized, 0.0)
            } else if maximum_channel == self.green_normalized {
                (self.blue_normalized - self.red_normalized, 2.0)
            } else {
                (self.red_normalized - self.green_normalized, 4.0)
            };

            let mut hue_degrees = (base_difference * inverse_chroma + sector_offset) * 60.0;
            if hue_degrees < 0.0 {
                hue_degrees += 360.0;
            }
            hue_degrees
        }

        /// HSV Value (V): brightness defined as max(R, G, B), 0..1.
        pub fn value_hsv(&self) -> ValueHSV {
            self.red_normalized
                .max(self.green_normalized.max(self.blue_normalized))
        }

        /// Chroma (C): color purity = max(R,G,B) - min(R,G,B).
        pub fn chroma(&self) -> Chroma {
            self.value_hsv()
                - self
                    .red_normalized
                    .min(self.green_normalized.min(self.blue_normalized))
        }

        /// Saturation (HSV): S = chroma / value.
        /// Drops to zero at black, where the ratio is undefined.
        pub fn saturation_hsv(&self) -> SaturationHSV {
            let maximum_channel = self.value_hsv();
            if maximum_channel <= 1e-6 {
                return 0.0;
            }
            self.chroma() / maximum_channel
        }
    }

    impl From<&[Byte]> for Pixel {
        /// Reads the first four bytes as RGBA. Short slices are padded with
        /// zeros (opaque alpha) rather than rejected.
        fn from(bytes: &[Byte]) -> Self {
            let mut rgba = [0, 0, 0, 255];
            for (slot, byte) in rgba.iter_mut().zip(bytes.iter().take(CHANNELS)) {
                *slot = *byte;
            }
            Pixel::new(rgba[0], rgba[1], rgba[2], rgba[3])
        }
    }

    impl From<&image::Rgba<u8>> for Pixel {
        fn from(rgba: &image::Rgba<u8>) -> Self {
            let [red, green, blue, alpha] = rgba.0;
            Pixel::new(red, green, blue, alpha)
        }
    }
}
